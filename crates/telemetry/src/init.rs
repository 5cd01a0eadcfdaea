// Path: crates/telemetry/src/init.rs
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Environment variable holding the filter directives for the `forge` binary.
pub const LOG_ENV: &str = "FORGE_LOG";

/// Pair lifecycle and tool events at `info`, everything else (bollard, hyper) at `warn`.
pub const DEFAULT_FILTER: &str = "warn,forge=info,casperlabs_forge=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the JSON subscriber used by the `forge` binary.
///
/// Events carry RFC3339 UTC timestamps and their `forge::*` target so pair,
/// tool and Docker events can be told apart. `log` records from dependencies
/// are bridged in. Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = fmt::layer()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(Registry::default().with(filter()).with(json))?;
    Ok(())
}

/// Installs a compact, test-writer subscriber. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .compact()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_tracing_init_is_idempotent() {
        init_test_tracing();
        init_test_tracing();
        tracing::info!(target: "casperlabs_telemetry", "still alive");
    }
}
