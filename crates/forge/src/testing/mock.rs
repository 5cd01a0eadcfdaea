// Path: crates/forge/src/testing/mock.rs

//! An in-memory `ContainerRuntime` for exercising the manager without Docker.

use super::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus, NetworkHandle,
    RuntimeResult, VolumeHandle,
};
use async_trait::async_trait;
use casperlabs_types::error::RuntimeError;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A file injected through `upload_archive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedFile {
    pub contents: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Clone)]
struct MockContainer {
    id: String,
    spec: ContainerSpec,
    status: ContainerStatus,
    files: BTreeMap<String, InjectedFile>,
    logs: String,
    probes: usize,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    networks: BTreeMap<String, NetworkHandle>,
    network_creates: usize,
    volumes: BTreeSet<String>,
    images: BTreeSet<String>,
    pulls: Vec<String>,
    containers: BTreeMap<String, MockContainer>,
    fail_create: BTreeSet<String>,
    fail_start: BTreeSet<String>,
    fail_pull: bool,
    network_race: bool,
    never_ready: bool,
    ready_after_probes: usize,
    volume_ack_delay: Option<Duration>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:04}", prefix, self.next_id)
    }

    fn container_mut(&mut self, key: &str) -> RuntimeResult<&mut MockContainer> {
        self.containers
            .values_mut()
            .find(|c| c.id == key || c.spec.name == key)
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {}", key)))
    }

    fn container(&self, key: &str) -> Option<&MockContainer> {
        self.containers
            .values()
            .find(|c| c.id == key || c.spec.name == key)
    }
}

/// Deterministic stand-in for the Docker daemon, with fault injection.
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<State>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes `create_container` fail for this container name.
    pub fn fail_create_for(&self, name: &str) {
        self.lock().fail_create.insert(name.to_string());
    }

    /// Makes `start_container` fail for this container name.
    pub fn fail_start_for(&self, name: &str) {
        self.lock().fail_start.insert(name.to_string());
    }

    pub fn fail_pulls(&self) {
        self.lock().fail_pull = true;
    }

    /// The next `create_network` reports a conflict after another "creator" made it.
    pub fn simulate_network_race(&self) {
        self.lock().network_race = true;
    }

    /// `path_exists` never reports success.
    pub fn never_ready(&self) {
        self.lock().never_ready = true;
    }

    /// `path_exists` succeeds only after this many failed probes per container.
    pub fn ready_after_probes(&self, probes: usize) {
        self.lock().ready_after_probes = probes;
    }

    /// `create_volume` creates the volume at once but reports success only after `delay`.
    pub fn delay_volume_ack(&self, delay: Duration) {
        self.lock().volume_ack_delay = Some(delay);
    }

    pub fn add_image(&self, image: &str) {
        self.lock().images.insert(image.to_string());
    }

    /// Registers a running container as if another tool had started it.
    pub fn add_running_container(&self, spec: ContainerSpec) -> ContainerHandle {
        let mut state = self.lock();
        let id = state.next_id("ctr");
        let handle = ContainerHandle {
            id: id.clone(),
            name: spec.name.clone(),
            network: Some(spec.network.clone()),
            volume: spec.mounts.first().map(|m| m.volume.clone()),
        };
        state.containers.insert(
            spec.name.clone(),
            MockContainer {
                id,
                spec,
                status: ContainerStatus::Running,
                files: BTreeMap::new(),
                logs: String::new(),
                probes: 0,
            },
        );
        handle
    }

    pub fn push_log(&self, container: &str, line: &str) {
        if let Ok(c) = self.lock().container_mut(container) {
            c.logs.push_str(line);
            c.logs.push('\n');
        }
    }

    pub fn network_create_calls(&self) -> usize {
        self.lock().network_creates
    }

    pub fn network_names(&self) -> Vec<String> {
        self.lock().networks.keys().cloned().collect()
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.lock().volumes.iter().cloned().collect()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    pub fn pulled_images(&self) -> Vec<String> {
        self.lock().pulls.clone()
    }

    pub fn spec(&self, container: &str) -> Option<ContainerSpec> {
        self.lock().container(container).map(|c| c.spec.clone())
    }

    pub fn file(&self, container: &str, path: &str) -> Option<InjectedFile> {
        self.lock()
            .container(container)
            .and_then(|c| c.files.get(path).cloned())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn find_network(&self, name: &str) -> RuntimeResult<Option<NetworkHandle>> {
        Ok(self.lock().networks.get(name).cloned())
    }

    async fn create_network(&self, name: &str) -> RuntimeResult<NetworkHandle> {
        let mut state = self.lock();
        state.network_creates += 1;
        if state.networks.contains_key(name) {
            return Err(RuntimeError::Conflict(format!(
                "network with name {} already exists",
                name
            )));
        }
        let handle = NetworkHandle {
            id: state.next_id("net"),
            name: name.to_string(),
        };
        state.networks.insert(name.to_string(), handle.clone());
        if state.network_race {
            state.network_race = false;
            return Err(RuntimeError::Conflict(format!(
                "network with name {} already exists",
                name
            )));
        }
        Ok(handle)
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.lock()
            .networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::NotFound(format!("network {} not found", name)))
    }

    async fn find_volume(&self, name: &str) -> RuntimeResult<Option<VolumeHandle>> {
        Ok(self.lock().volumes.get(name).map(|n| VolumeHandle { name: n.clone() }))
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<VolumeHandle> {
        // Docker returns the existing volume for a repeated name.
        let delay = {
            let mut state = self.lock();
            state.volumes.insert(name.to_string());
            state.volume_ack_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(VolumeHandle {
            name: name.to_string(),
        })
    }

    async fn remove_volume(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        let in_use = state
            .containers
            .values()
            .any(|c| c.spec.mounts.iter().any(|m| m.volume == name));
        if in_use {
            return Err(RuntimeError::Conflict(format!("volume {} is in use", name)));
        }
        if state.volumes.remove(name) {
            Ok(())
        } else {
            Err(RuntimeError::NotFound(format!("no such volume: {}", name)))
        }
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        Ok(self.lock().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        if state.fail_pull {
            return Err(RuntimeError::NotFound(format!(
                "pull access denied for {}",
                image
            )));
        }
        state.pulls.push(image.to_string());
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerHandle> {
        let mut state = self.lock();
        if state.fail_create.contains(&spec.name) {
            return Err(RuntimeError::Api(format!(
                "injected create failure for {}",
                spec.name
            )));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Conflict(format!(
                "container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !state.networks.contains_key(&spec.network) {
            return Err(RuntimeError::NotFound(format!(
                "network {} not found",
                spec.network
            )));
        }
        if !state.images.contains(&spec.image) {
            return Err(RuntimeError::NotFound(format!("No such image: {}", spec.image)));
        }
        let id = state.next_id("ctr");
        state.containers.insert(
            spec.name.clone(),
            MockContainer {
                id: id.clone(),
                spec: spec.clone(),
                status: ContainerStatus::Created,
                files: BTreeMap::new(),
                logs: String::new(),
                probes: 0,
            },
        );
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
            network: Some(spec.network.clone()),
            volume: spec.mounts.first().map(|m| m.volume.clone()),
        })
    }

    async fn upload_archive(
        &self,
        container: &str,
        dest_dir: &str,
        tar: Vec<u8>,
    ) -> RuntimeResult<()> {
        let mut files = BTreeMap::new();
        let mut archive = tar::Archive::new(tar.as_slice());
        let entries = archive
            .entries()
            .map_err(|e| RuntimeError::Api(format!("bad archive: {}", e)))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| RuntimeError::Api(format!("bad entry: {}", e)))?;
            let path = entry
                .path()
                .map_err(|e| RuntimeError::Api(format!("bad path: {}", e)))?
                .to_string_lossy()
                .into_owned();
            let mode = entry.header().mode().unwrap_or(0o644);
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| RuntimeError::Api(format!("bad body: {}", e)))?;
            files.insert(
                format!("{}/{}", dest_dir.trim_end_matches('/'), path),
                InjectedFile { contents, mode },
            );
        }
        let mut state = self.lock();
        state.container_mut(container)?.files.extend(files);
        Ok(())
    }

    async fn start_container(&self, container: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        let fail = state
            .container(container)
            .is_some_and(|c| state.fail_start.contains(&c.spec.name));
        let c = state.container_mut(container)?;
        if fail {
            c.status = ContainerStatus::Exited;
            return Err(RuntimeError::Api(format!(
                "injected start failure for {}",
                c.spec.name
            )));
        }
        c.status = ContainerStatus::Running;
        c.logs.push_str(&format!("{} started\n", c.spec.name));
        Ok(())
    }

    async fn stop_container(&self, container: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        let c = state.container_mut(container)?;
        if c.status == ContainerStatus::Running {
            c.status = ContainerStatus::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        let name = state.container_mut(container)?.spec.name.clone();
        state.containers.remove(&name);
        Ok(())
    }

    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ContainerHandle>> {
        Ok(self.lock().containers.get(name).map(|c| ContainerHandle {
            id: c.id.clone(),
            name: c.spec.name.clone(),
            network: Some(c.spec.network.clone()),
            volume: c.spec.mounts.first().map(|m| m.volume.clone()),
        }))
    }

    async fn container_status(&self, container: &str) -> RuntimeResult<ContainerStatus> {
        Ok(self
            .lock()
            .container(container)
            .map_or(ContainerStatus::Removed, |c| c.status))
    }

    /// A container whose command names a file creates it once ready; only a
    /// path ending in that file is then reported as present.
    async fn path_exists(&self, container: &str, path: &str) -> RuntimeResult<bool> {
        let mut state = self.lock();
        let never_ready = state.never_ready;
        let ready_after = state.ready_after_probes;
        let c = state.container_mut(container)?;
        if c.status != ContainerStatus::Running {
            return Err(RuntimeError::Conflict(format!(
                "container {} is not running",
                c.spec.name
            )));
        }
        c.probes += 1;
        let created = c
            .spec
            .cmd
            .as_ref()
            .and_then(|cmd| cmd.last())
            .map(|arg| arg.trim_start_matches("./"));
        let names_the_path = match created {
            Some(file) => path.ends_with(&format!("/{}", file)),
            None => true,
        };
        Ok(names_the_path && !never_ready && c.probes > ready_after)
    }

    async fn logs(&self, container: &str) -> RuntimeResult<String> {
        let state = self.lock();
        state
            .container(container)
            .map(|c| c.logs.clone())
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {}", container)))
    }
}
