// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # CasperLabs Harness Types
//!
//! Configuration objects and error enums shared by the harness crates.
//!
//! ## Architectural Role
//!
//! This crate has no dependency on a container runtime. The manager in
//! `casperlabs-forge` and any runtime implementation both speak in terms of
//! the types defined here, so the error taxonomy and the `PairConfig` schema
//! stay stable regardless of which backend drives the containers.

/// Shared configuration structures (`PairConfig` and its sections).
pub mod config;
/// A unified set of all error types used across the harness.
pub mod error;
