// Path: crates/types/src/config/mod.rs

//! Configuration for the paired process manager.
//!
//! Every section has defaults matching the CasperLabs docker-compose layout, so
//! an empty TOML document is a valid configuration.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `images.version`.
pub const ENV_VERSION: &str = "CL_VERSION";
/// Environment variable overriding `validator.public_key`.
pub const ENV_VALIDATOR_PUBLIC_KEY: &str = "CL_VALIDATOR_PUBLIC_KEY";
/// Environment variable overriding `validator.private_key`.
pub const ENV_VALIDATOR_PRIVATE_KEY: &str = "CL_VALIDATOR_PRIVATE_KEY";

/// Selects how the manager brings a pair up.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StartupStrategy {
    /// Drive the container runtime API directly.
    #[default]
    Direct,
    /// Invoke the external build tool (`make node-<N>/up`) and adopt its containers.
    ExternalTool,
}

/// Whether a pair gets its own socket volume or shares one with every pair.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeScope {
    /// One volume per node index, named `<name>-<N>`.
    #[default]
    PerNode,
    /// A single volume named `<name>` used by all pairs.
    Shared,
}

/// When to pull an image before creating a container from it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull only if the image is missing locally.
    #[default]
    IfNotPresent,
    /// Always pull before creating a container.
    Always,
    /// Never pull; a missing image is a provisioning error.
    Never,
}

/// How strictly credential assignments are scraped from tool output.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ParsePolicy {
    /// A missing or empty assignment leaves the credential unset.
    #[default]
    Lenient,
    /// A missing or empty assignment is an error.
    Strict,
}

/// Socket volume settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct VolumeConfig {
    /// Base volume name.
    pub name: String,
    /// Per-node or shared.
    pub scope: VolumeScope,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            name: "socketvolume".to_string(),
            scope: VolumeScope::PerNode,
        }
    }
}

/// Image references for both processes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ImageConfig {
    /// Repository of the node image.
    pub node: String,
    /// Repository of the execution-engine image.
    pub engine: String,
    /// Tag applied to both repositories.
    pub version: String,
    /// Pull behaviour before container creation.
    pub pull_policy: PullPolicy,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            node: "casperlabs/node".to_string(),
            engine: "casperlabs/execution-engine".to_string(),
            version: "latest".to_string(),
            pull_policy: PullPolicy::IfNotPresent,
        }
    }
}

/// Execution-engine container settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Start an engine alongside the node. When `false` only the node runs.
    pub enabled: bool,
    /// Mount point of the socket volume inside the engine container.
    pub socket_mount: String,
    /// Directory of the socket relative to the engine's workdir. The engine's
    /// sole argument is this directory joined with `socket_file`.
    pub socket_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_mount: "/opt/docker/.casperlabs/sockets".to_string(),
            socket_dir: ".casperlabs/sockets".to_string(),
        }
    }
}

/// Node container settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// `HOME` inside the node container.
    pub home: String,
    /// Hostname of the peer new nodes contact first.
    pub bootstrap_hostname: String,
    /// Mount point of the socket volume inside the node container.
    pub socket_mount: String,
    /// Directory the startup script is uploaded into; also the working directory.
    pub script_dir: String,
    /// File name of the startup script.
    pub script_name: String,
    /// Host path of a startup script. The bundled script is used when unset.
    pub start_script: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            home: "/root".to_string(),
            bootstrap_hostname: "node-0".to_string(),
            socket_mount: "/root/.casperlabs/sockets".to_string(),
            script_dir: "/opt/docker".to_string(),
            script_name: "start-node.sh".to_string(),
            start_script: None,
        }
    }
}

/// Validator keypair passed through to the node environment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ValidatorKeys {
    /// Validator public key.
    pub public_key: Option<String>,
    /// Validator private key.
    pub private_key: Option<String>,
}

/// Engine readiness barrier.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Wait for the engine socket before starting the node.
    pub enabled: bool,
    /// Maximum time to wait for the socket file.
    pub timeout_secs: u64,
    /// Delay between probes.
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            poll_interval_ms: 250,
        }
    }
}

/// External build tool invocation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExternalToolConfig {
    /// Program to run, `make` by default.
    pub program: String,
    /// Arguments placed before the target.
    pub args: Vec<String>,
    /// Directory the tool runs in, when bringing pairs up via the tool by default.
    pub working_dir: Option<PathBuf>,
    /// Credential parsing policy for the tool's output.
    pub parse_policy: ParsePolicy,
}

impl Default for ExternalToolConfig {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            args: Vec::new(),
            working_dir: None,
            parse_policy: ParsePolicy::Lenient,
        }
    }
}

/// Top-level configuration of a `PairedProcessManager`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PairConfig {
    /// Name of the shared network every pair joins.
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// File name of the socket the engine creates in the shared volume.
    #[serde(default = "default_socket_file")]
    pub socket_file: String,
    /// User both containers run as.
    #[serde(default = "default_user")]
    pub user: String,
    /// Default strategy used by `PairedProcessManager::up`.
    #[serde(default)]
    pub strategy: StartupStrategy,
    /// Upper bound for a whole direct `create` call.
    #[serde(default)]
    pub create_timeout_secs: Option<u64>,
    /// Socket volume settings.
    #[serde(default)]
    pub volume: VolumeConfig,
    /// Image references.
    #[serde(default)]
    pub images: ImageConfig,
    /// Engine container settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Node container settings.
    #[serde(default)]
    pub node: NodeConfig,
    /// Validator keypair.
    #[serde(default)]
    pub validator: ValidatorKeys,
    /// Readiness barrier settings.
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// External tool settings.
    #[serde(default)]
    pub external_tool: ExternalToolConfig,
}

fn default_network_name() -> String {
    "casperlabs".to_string()
}
fn default_socket_file() -> String {
    ".casper-node.sock".to_string()
}
fn default_user() -> String {
    "root".to_string()
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            network_name: default_network_name(),
            socket_file: default_socket_file(),
            user: default_user(),
            strategy: StartupStrategy::Direct,
            create_timeout_secs: None,
            volume: VolumeConfig::default(),
            images: ImageConfig::default(),
            engine: EngineConfig::default(),
            node: NodeConfig::default(),
            validator: ValidatorKeys::default(),
            readiness: ReadinessConfig::default(),
            external_tool: ExternalToolConfig::default(),
        }
    }
}

impl PairConfig {
    /// Parses a configuration from a TOML document and validates it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PairConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Applies `CL_VERSION` and the validator key variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(version) = get(ENV_VERSION) {
            self.images.version = version;
        }
        if let Some(key) = get(ENV_VALIDATOR_PUBLIC_KEY) {
            self.validator.public_key = Some(key);
        }
        if let Some(key) = get(ENV_VALIDATOR_PRIVATE_KEY) {
            self.validator.private_key = Some(key);
        }
    }

    /// Rejects values the manager cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
            Ok(())
        }
        fn absolute(field: &'static str, value: &str) -> Result<(), ConfigError> {
            if !value.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("'{}' is not an absolute container path", value),
                });
            }
            Ok(())
        }

        non_empty("network_name", &self.network_name)?;
        non_empty("socket_file", &self.socket_file)?;
        non_empty("volume.name", &self.volume.name)?;
        non_empty("images.node", &self.images.node)?;
        non_empty("images.engine", &self.images.engine)?;
        non_empty("images.version", &self.images.version)?;
        non_empty("external_tool.program", &self.external_tool.program)?;
        non_empty("node.script_name", &self.node.script_name)?;
        absolute("engine.socket_mount", &self.engine.socket_mount)?;
        non_empty("engine.socket_dir", &self.engine.socket_dir)?;
        if self.engine.socket_dir.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "engine.socket_dir",
                reason: "must be relative to the engine workdir".to_string(),
            });
        }
        let socket_dir = format!("/{}", self.engine.socket_dir.trim_end_matches('/'));
        if !self.engine.socket_mount.trim_end_matches('/').ends_with(&socket_dir) {
            return Err(ConfigError::Invalid {
                field: "engine.socket_dir",
                reason: format!(
                    "'{}' is not where '{}' is mounted",
                    self.engine.socket_dir, self.engine.socket_mount
                ),
            });
        }
        absolute("node.socket_mount", &self.node.socket_mount)?;
        absolute("node.script_dir", &self.node.script_dir)?;

        if self.socket_file.contains('/') {
            return Err(ConfigError::Invalid {
                field: "socket_file",
                reason: "must be a bare file name".to_string(),
            });
        }
        if self.node.script_name.contains('/') {
            return Err(ConfigError::Invalid {
                field: "node.script_name",
                reason: "must be a bare file name".to_string(),
            });
        }
        if self.readiness.enabled && self.readiness.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "readiness.timeout_secs",
                reason: "must be positive when readiness is enabled".to_string(),
            });
        }
        if self.readiness.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "readiness.poll_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.create_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "create_timeout_secs",
                reason: "must be positive when set".to_string(),
            });
        }
        Ok(())
    }

    /// Full node image reference, `repository:tag`.
    pub fn node_image(&self) -> String {
        format!("{}:{}", self.images.node, self.images.version)
    }

    /// Full engine image reference, `repository:tag`.
    pub fn engine_image(&self) -> String {
        format!("{}:{}", self.images.engine, self.images.version)
    }

    /// Socket volume name for a node index under the configured scope.
    pub fn volume_name(&self, node_index: u32) -> String {
        match self.volume.scope {
            VolumeScope::PerNode => format!("{}-{}", self.volume.name, node_index),
            VolumeScope::Shared => self.volume.name.clone(),
        }
    }

    /// Socket path as seen from inside the engine container.
    pub fn engine_socket_path(&self) -> String {
        format!(
            "{}/{}",
            self.engine.socket_mount.trim_end_matches('/'),
            self.socket_file
        )
    }

    /// The engine's sole argument: where it creates its socket, relative to its workdir.
    pub fn engine_socket_arg(&self) -> String {
        format!(
            "{}/{}",
            self.engine.socket_dir.trim_end_matches('/'),
            self.socket_file
        )
    }

    /// Socket path as seen from inside the node container (`CL_GRPC_SOCKET`).
    pub fn grpc_socket_path(&self) -> String {
        format!(
            "{}/{}",
            self.node.socket_mount.trim_end_matches('/'),
            self.socket_file
        )
    }
}
