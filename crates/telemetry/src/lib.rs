// Path: crates/telemetry/src/lib.rs
pub mod init;
