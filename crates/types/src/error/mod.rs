// Path: crates/types/src/error/mod.rs
//! Core error types for the harness.

use thiserror::Error;

/// Errors reported by a container runtime implementation.
///
/// Runtime implementations map their client-specific failures onto these three
/// cases so the manager can tell "already gone" and "already exists" apart
/// from real API failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The referenced network, volume, image or container does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// A resource with the requested name already exists.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Any other failure returned by the runtime API.
    #[error("Runtime API error: {0}")]
    Api(String),
}

impl RuntimeError {
    /// Returns `true` if the error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }

    /// Returns `true` if the error reports a name collision.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RuntimeError::Conflict(_))
    }
}

/// Errors related to loading and validating a `PairConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// The path that was being read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for the schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field holds a value the harness cannot work with.
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field, in dotted TOML notation.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Errors returned by the paired process manager.
#[derive(Error, Debug)]
pub enum PairError {
    /// Creating or starting a network, volume, image or container failed.
    #[error("Failed to provision {resource}: {reason}")]
    Provisioning {
        /// The resource that could not be provisioned, e.g. `container node-0`.
        resource: String,
        /// The runtime's description of the failure.
        reason: String,
    },
    /// A container expected under a well-known name does not exist.
    #[error("Docker container '{0}' not found")]
    ProcessNotFound(String),
    /// Credential output did not satisfy the strict parsing policy.
    #[error("Failed to parse '{key}' from tool output: {reason}")]
    CredentialParse {
        /// The marker key, e.g. `CL_VALIDATOR_PUBLIC_KEY`.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The engine never produced its socket file within the readiness window.
    #[error("Socket '{path}' did not appear in '{container}' after {waited_secs}s")]
    ReadinessTimeout {
        /// The container that was probed.
        container: String,
        /// The socket path inside that container.
        path: String,
        /// How long the barrier waited.
        waited_secs: u64,
    },
    /// The whole `create` call exceeded its configured deadline.
    #[error("Creating pair for node {node_index} exceeded the {secs}s deadline")]
    Deadline {
        /// The node index being created.
        node_index: u32,
        /// The configured deadline.
        secs: u64,
    },
    /// Another active pair already uses this node index.
    #[error("Node index {0} is already in use by an active pair")]
    IndexInUse(u32),
    /// The external build tool exited unsuccessfully.
    #[error("External tool target '{target}' failed (exit code {code:?}): {stderr}")]
    ExternalTool {
        /// The target that was invoked, e.g. `node-0/up`.
        target: String,
        /// The exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error output.
        stderr: String,
    },
    /// A lifecycle transition was attempted that the state machine forbids.
    #[error("Invalid pair state transition from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The requested state.
        to: String,
    },
    /// The manager's configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A runtime query (logs, status) failed outside of provisioning.
    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl PairError {
    /// Builds a `Provisioning` error from a runtime failure.
    pub fn provisioning(resource: impl Into<String>, err: RuntimeError) -> Self {
        PairError::Provisioning {
            resource: resource.into(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_carries_resource_and_reason() {
        let err = PairError::provisioning(
            "container node-0",
            RuntimeError::Conflict("name in use".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("container node-0"));
        assert!(msg.contains("name in use"));
    }

    #[test]
    fn process_not_found_names_the_container() {
        let err = PairError::ProcessNotFound("node-5".into());
        assert_eq!(err.to_string(), "Docker container 'node-5' not found");
    }

    #[test]
    fn runtime_error_classification() {
        assert!(RuntimeError::NotFound("x".into()).is_not_found());
        assert!(!RuntimeError::Api("x".into()).is_not_found());
        assert!(RuntimeError::Conflict("x".into()).is_conflict());
    }
}
