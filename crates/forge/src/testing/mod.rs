// Path: crates/forge/src/testing/mod.rs

//! Helpers for bringing node / execution-engine pairs up and down in tests.
//! They are exposed as a public library so downstream suites can drive
//! containers with the same tooling the harness uses itself.

pub mod archive;
pub mod credentials;
pub mod docker;
pub mod manager;
pub mod mock;
pub mod pair;
pub mod poll;
pub mod runtime;
pub mod tool;

pub use credentials::{CredentialParser, ValidatorCredentials};
pub use docker::DockerRuntime;
pub use manager::PairedProcessManager;
pub use mock::MockRuntime;
pub use pair::{PairState, ProcessKind, ProcessPair};
pub use runtime::{ContainerRuntime, ContainerSpec, ContainerStatus};
pub use tool::ExternalTool;

use anyhow::{anyhow, Result};
use poll::wait_for;
use std::time::Duration;

const LOG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Installs the compact test subscriber. Safe to call from every test.
pub fn init_test_logging() {
    casperlabs_telemetry::init::init_test_tracing();
}

/// Polls one process's logs until a line containing `pattern` shows up and returns it.
pub async fn assert_log_contains(
    manager: &PairedProcessManager,
    pair: &ProcessPair,
    which: ProcessKind,
    pattern: &str,
    timeout: Duration,
) -> Result<String> {
    let label = format!("{}-{}", which, pair.node_index());
    let found = wait_for(&label, LOG_POLL_INTERVAL, timeout, || async move {
        let logs = manager.logs(pair, which).await?;
        Ok::<_, casperlabs_types::error::PairError>(logs.and_then(|text| {
            text.lines()
                .find(|line| line.contains(pattern))
                .map(str::to_string)
        }))
    })
    .await;

    match found {
        Ok(line) => Ok(line),
        Err(_) => {
            let received = manager.logs(pair, which).await.ok().flatten().unwrap_or_default();
            Err(anyhow!(
                "[{}] Timeout waiting for pattern '{}'.\n--- Received Logs ---\n{}\n--- End Logs ---",
                label,
                pattern,
                received
            ))
        }
    }
}
