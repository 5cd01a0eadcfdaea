// Path: crates/forge/src/testing/poll.rs

use super::runtime::ContainerRuntime;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Returned when a polled condition did not hold before the deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTimeout {
    pub description: String,
    pub waited: Duration,
}

/// Generic polling function that waits for an async condition to be met.
pub async fn wait_for<F, Fut, T, E>(
    description: &str,
    interval: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
{
    let start = Instant::now();
    loop {
        match condition().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                // Transient runtime errors are retried until the timeout.
                tracing::trace!("Polling for '{}' received transient error: {}", description, e);
            }
        }
        if start.elapsed() > timeout {
            return Err(PollTimeout {
                description: description.to_string(),
                waited: start.elapsed(),
            });
        }
        sleep(interval).await;
    }
}

/// Waits for `path` to exist inside `container`.
pub async fn wait_for_path<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container: &str,
    path: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<(), PollTimeout> {
    wait_for(
        &format!("{} to appear in {}", path, container),
        interval,
        timeout,
        || async move {
            runtime
                .path_exists(container, path)
                .await
                .map(|exists| exists.then_some(()))
        },
    )
    .await
}
