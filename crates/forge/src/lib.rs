// crates/forge/src/lib.rs

#![forbid(unsafe_code)]

//! # CasperLabs Forge Library
//!
//! Runs a CasperLabs ledger node and its execution engine as a pair of Docker
//! containers sharing a network and a socket volume, so integration tests can
//! bring nodes up, read their logs and tear them down again.
//!
//! Pairs are created either directly through the Docker API or by delegating to
//! an external build tool (`make node-<N>/up`) and adopting the containers it
//! starts. Both paths produce a `ProcessPair` that `PairedProcessManager`
//! shuts down the same way.
//!
//! This crate contains modules for:
//! - `testing`: the container runtime seam, the pair manager and its helpers.

pub mod testing;

pub use testing::{
    manager::PairedProcessManager,
    pair::{PairState, ProcessKind, ProcessPair},
    runtime::{ContainerRuntime, ContainerStatus},
};
