// Path: crates/forge/src/testing/runtime.rs

//! The container-runtime contract consumed by the pair manager.

use async_trait::async_trait;
use casperlabs_types::error::RuntimeError;
use std::collections::BTreeMap;
use std::fmt;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// A network known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

/// A named volume known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeHandle {
    pub name: String,
}

/// A container owned by a `ProcessPair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    /// Network the container was attached to at creation, if known.
    pub network: Option<String>,
    /// Volume mounted into the container at creation, if known.
    pub volume: Option<String>,
}

/// A `volume:path` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub volume: String,
    pub target: String,
}

impl Mount {
    pub fn new(volume: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            target: target.into(),
        }
    }

    /// The Docker `binds` form, `volume:/target`.
    pub fn to_bind(&self) -> String {
        format!("{}:{}", self.volume, self.target)
    }
}

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub hostname: String,
    pub user: Option<String>,
    pub network: String,
    pub mounts: Vec<Mount>,
    pub env: BTreeMap<String, String>,
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
}

impl ContainerSpec {
    /// Environment in `KEY=value` form.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// Runtime status of a named container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Exited,
    /// The container no longer exists.
    Removed,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Abstracts the container runtime (Docker via bollard, or in-memory for tests).
///
/// Implementations must map "no such resource" onto `RuntimeError::NotFound`
/// and name collisions onto `RuntimeError::Conflict`; the manager relies on
/// both for idempotent teardown and race-tolerant network creation.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Looks a network up by exact name.
    async fn find_network(&self, name: &str) -> RuntimeResult<Option<NetworkHandle>>;

    async fn create_network(&self, name: &str) -> RuntimeResult<NetworkHandle>;

    async fn remove_network(&self, name: &str) -> RuntimeResult<()>;

    async fn find_volume(&self, name: &str) -> RuntimeResult<Option<VolumeHandle>>;

    async fn create_volume(&self, name: &str) -> RuntimeResult<VolumeHandle>;

    async fn remove_volume(&self, name: &str) -> RuntimeResult<()>;

    /// Returns `true` if the image reference is present locally.
    async fn image_exists(&self, image: &str) -> RuntimeResult<bool>;

    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Creates, but does not start, a container.
    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerHandle>;

    /// Extracts a tar archive into `dest_dir` of a created or running container.
    async fn upload_archive(&self, container: &str, dest_dir: &str, tar: Vec<u8>)
        -> RuntimeResult<()>;

    async fn start_container(&self, container: &str) -> RuntimeResult<()>;

    async fn stop_container(&self, container: &str) -> RuntimeResult<()>;

    async fn remove_container(&self, container: &str) -> RuntimeResult<()>;

    /// Finds a container (running or not) by exact name.
    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ContainerHandle>>;

    /// Reports `ContainerStatus::Removed` rather than an error for unknown containers.
    async fn container_status(&self, container: &str) -> RuntimeResult<ContainerStatus>;

    /// Probes whether `path` exists inside a running container.
    async fn path_exists(&self, container: &str, path: &str) -> RuntimeResult<bool>;

    /// Decoded stdout and stderr produced so far.
    async fn logs(&self, container: &str) -> RuntimeResult<String>;
}
