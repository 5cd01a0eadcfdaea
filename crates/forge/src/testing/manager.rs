// Path: crates/forge/src/testing/manager.rs

//! Lifecycle management for node / execution-engine container pairs.

use super::archive::{single_file_archive, EXECUTABLE_MODE};
use super::credentials::{CredentialParser, ValidatorCredentials};
use super::pair::{
    engine_container_name, node_container_name, PairState, ProcessKind, ProcessPair,
};
use super::poll::wait_for_path;
use super::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus, Mount, NetworkHandle,
    VolumeHandle,
};
use super::tool::ExternalTool;
use casperlabs_types::config::{PairConfig, PullPolicy, StartupStrategy, VolumeScope};
use casperlabs_types::error::{ConfigError, PairError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

const BUNDLED_START_SCRIPT: &str = include_str!("../../assets/start-node.sh");

/// Resources created by one in-flight `create` call, undone if it fails.
#[derive(Debug, Default)]
struct Provisioned {
    containers: Vec<ContainerHandle>,
    /// Container names whose creation was requested but not acknowledged.
    pending: Vec<String>,
    volume: Option<String>,
}

/// Brings node / execution-engine pairs up and down on a shared network.
///
/// The manager is cheap to share behind an `Arc`; independent node indices may
/// be created and shut down from separate tasks. Node indices are unique among
/// the pairs this manager currently has active.
pub struct PairedProcessManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: PairConfig,
    start_script: Vec<u8>,
    active: Mutex<BTreeSet<u32>>,
}

impl PairedProcessManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: PairConfig) -> Result<Self, PairError> {
        config.validate()?;
        let start_script = match &config.node.start_script {
            Some(path) => std::fs::read(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?,
            None => BUNDLED_START_SCRIPT.as_bytes().to_vec(),
        };
        Ok(Self {
            runtime,
            config,
            start_script,
            active: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn config(&self) -> &PairConfig {
        &self.config
    }

    pub async fn active_indices(&self) -> Vec<u32> {
        self.active.lock().await.iter().copied().collect()
    }

    async fn reserve(&self, node_index: u32) -> Result<(), PairError> {
        if !self.active.lock().await.insert(node_index) {
            return Err(PairError::IndexInUse(node_index));
        }
        Ok(())
    }

    async fn release(&self, node_index: u32) {
        self.active.lock().await.remove(&node_index);
    }

    /// Brings a pair up with the configured `StartupStrategy`.
    pub async fn up(&self, node_index: u32) -> Result<ProcessPair, PairError> {
        match self.config.strategy {
            StartupStrategy::Direct => self.create(node_index).await,
            StartupStrategy::ExternalTool => {
                let dir = self.config.external_tool.working_dir.clone().ok_or(
                    ConfigError::Invalid {
                        field: "external_tool.working_dir",
                        reason: "required when strategy is external-tool".to_string(),
                    },
                )?;
                self.create_via_external_tool(node_index, &dir).await
            }
        }
    }

    /// Finds the shared network by name, creating it if absent.
    ///
    /// A concurrent creator winning the race is not an error: the network it
    /// created is looked up and returned.
    pub async fn resolve_network(&self) -> Result<NetworkHandle, PairError> {
        let name = &self.config.network_name;
        let resource = || format!("network {}", name);

        if let Some(network) = self
            .runtime
            .find_network(name)
            .await
            .map_err(|e| PairError::provisioning(resource(), e))?
        {
            tracing::debug!(target: "forge::pair", network = %name, id = %network.id, "Reusing network");
            return Ok(network);
        }

        match self.runtime.create_network(name).await {
            Ok(network) => {
                tracing::info!(target: "forge::pair", network = %name, id = %network.id, "Created network");
                Ok(network)
            }
            Err(e) if e.is_conflict() => self
                .runtime
                .find_network(name)
                .await
                .map_err(|e| PairError::provisioning(resource(), e))?
                .ok_or_else(|| PairError::Provisioning {
                    resource: resource(),
                    reason: "reported as existing but could not be found".to_string(),
                }),
            Err(e) => Err(PairError::provisioning(resource(), e)),
        }
    }

    /// Finds the socket volume for `node_index`, creating it if absent.
    pub async fn resolve_volume(&self, node_index: u32) -> Result<VolumeHandle, PairError> {
        let name = self.config.volume_name(node_index);
        match self.find_volume(&name).await? {
            Some(volume) => Ok(volume),
            None => self.create_volume(node_index, &name).await,
        }
    }

    async fn find_volume(&self, name: &str) -> Result<Option<VolumeHandle>, PairError> {
        self.runtime
            .find_volume(name)
            .await
            .map_err(|e| PairError::provisioning(format!("volume {}", name), e))
    }

    async fn create_volume(&self, node_index: u32, name: &str) -> Result<VolumeHandle, PairError> {
        let volume = self
            .runtime
            .create_volume(name)
            .await
            .map_err(|e| PairError::provisioning(format!("volume {}", name), e))?;
        tracing::info!(target: "forge::pair", node_index, volume = %volume.name, "Created volume");
        Ok(volume)
    }

    /// Container parameters for the execution engine of `node_index`.
    pub fn engine_spec(
        &self,
        node_index: u32,
        network: &NetworkHandle,
        volume: &VolumeHandle,
    ) -> ContainerSpec {
        let name = engine_container_name(node_index);
        ContainerSpec {
            image: self.config.engine_image(),
            hostname: name.clone(),
            name,
            user: Some(self.config.user.clone()),
            network: network.name.clone(),
            mounts: vec![Mount::new(&volume.name, &self.config.engine.socket_mount)],
            env: BTreeMap::new(),
            entrypoint: None,
            cmd: Some(vec![self.config.engine_socket_arg()]),
            working_dir: None,
        }
    }

    /// Container parameters for the node of `node_index`.
    pub fn node_spec(
        &self,
        node_index: u32,
        network: &NetworkHandle,
        volume: &VolumeHandle,
    ) -> ContainerSpec {
        let name = node_container_name(node_index);
        let node = &self.config.node;

        let mut env = BTreeMap::new();
        env.insert("HOME".to_string(), node.home.clone());
        env.insert(
            "BOOTSTRAP_HOSTNAME".to_string(),
            node.bootstrap_hostname.clone(),
        );
        env.insert("CL_GRPC_SOCKET".to_string(), self.config.grpc_socket_path());
        if let Some(key) = &self.config.validator.public_key {
            env.insert("CL_VALIDATOR_PUBLIC_KEY".to_string(), key.clone());
        }
        if let Some(key) = &self.config.validator.private_key {
            env.insert("CL_VALIDATOR_PRIVATE_KEY".to_string(), key.clone());
        }

        let script = &node.script_name;
        ContainerSpec {
            image: self.config.node_image(),
            hostname: name.clone(),
            name,
            user: Some(self.config.user.clone()),
            network: network.name.clone(),
            mounts: vec![Mount::new(&volume.name, &node.socket_mount)],
            env,
            entrypoint: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("chmod +x ./{script} && ./{script}"),
            ]),
            cmd: None,
            working_dir: Some(node.script_dir.clone()),
        }
    }

    async fn image_present(&self, image: &str) -> Result<bool, PairError> {
        self.runtime
            .image_exists(image)
            .await
            .map_err(|e| PairError::provisioning(format!("image {}", image), e))
    }

    async fn ensure_image(&self, image: &str) -> Result<(), PairError> {
        let pull = match self.config.images.pull_policy {
            PullPolicy::Always => true,
            PullPolicy::IfNotPresent => !self.image_present(image).await?,
            PullPolicy::Never => {
                if !self.image_present(image).await? {
                    return Err(PairError::Provisioning {
                        resource: format!("image {}", image),
                        reason: "not present locally and pull_policy is never".to_string(),
                    });
                }
                false
            }
        };
        if pull {
            tracing::info!(target: "forge::pair", image, "Pulling image");
            self.runtime
                .pull_image(image)
                .await
                .map_err(|e| PairError::provisioning(format!("image {}", image), e))?;
        }
        Ok(())
    }

    /// Creates, optionally injects a script into, and starts one container.
    async fn launch(
        &self,
        spec: &ContainerSpec,
        script: Option<&[u8]>,
        ledger: &mut Provisioned,
    ) -> Result<ContainerHandle, PairError> {
        let resource = || format!("container {}", spec.name);
        self.ensure_image(&spec.image).await?;

        ledger.pending.push(spec.name.clone());
        let handle = self
            .runtime
            .create_container(spec)
            .await
            .map_err(|e| PairError::provisioning(resource(), e))?;
        ledger.pending.retain(|n| n != &spec.name);
        ledger.containers.push(handle.clone());

        if let Some(script) = script {
            let tar = single_file_archive(&self.config.node.script_name, script, EXECUTABLE_MODE)
                .map_err(|e| PairError::Provisioning {
                    resource: resource(),
                    reason: format!("failed to archive start script: {}", e),
                })?;
            self.runtime
                .upload_archive(&handle.id, &self.config.node.script_dir, tar)
                .await
                .map_err(|e| PairError::provisioning(resource(), e))?;
        }

        self.runtime
            .start_container(&handle.id)
            .await
            .map_err(|e| PairError::provisioning(resource(), e))?;
        tracing::info!(target: "forge::pair", container = %handle.name, id = %handle.id, "Started container");
        Ok(handle)
    }

    async fn await_engine_socket(&self, engine: &ContainerHandle) -> Result<(), PairError> {
        let readiness = &self.config.readiness;
        if !readiness.enabled {
            return Ok(());
        }
        let path = self.config.engine_socket_path();
        wait_for_path(
            self.runtime.as_ref(),
            &engine.id,
            &path,
            Duration::from_millis(readiness.poll_interval_ms),
            Duration::from_secs(readiness.timeout_secs),
        )
        .await
        .map_err(|t| PairError::ReadinessTimeout {
            container: engine.name.clone(),
            path: path.clone(),
            waited_secs: t.waited.as_secs(),
        })?;
        tracing::debug!(target: "forge::pair", container = %engine.name, %path, "Engine socket ready");
        Ok(())
    }

    fn transition(
        &self,
        node_index: u32,
        state: &mut PairState,
        next: PairState,
    ) -> Result<(), PairError> {
        state.advance(next)?;
        tracing::debug!(target: "forge::pair", node_index, state = ?next, "Pair state");
        Ok(())
    }

    /// Brings up the engine and node for `node_index` through the runtime API.
    ///
    /// On failure every container and per-node volume created by this call is
    /// removed before the error is returned. The shared network is kept.
    pub async fn create(&self, node_index: u32) -> Result<ProcessPair, PairError> {
        self.reserve(node_index).await?;
        let mut ledger = Provisioned::default();

        let result = match self.config.create_timeout_secs {
            Some(secs) => {
                match timeout(
                    Duration::from_secs(secs),
                    self.provision(node_index, &mut ledger),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PairError::Deadline { node_index, secs }),
                }
            }
            None => self.provision(node_index, &mut ledger).await,
        };

        match result {
            Ok(pair) => {
                tracing::info!(target: "forge::pair", node_index, network = %pair.network.name, "Pair is up");
                Ok(pair)
            }
            Err(e) => {
                tracing::warn!(target: "forge::pair", node_index, error = %e, "Pair creation failed; rolling back");
                let cancelled = matches!(e, PairError::Deadline { .. });
                self.rollback(ledger, cancelled).await;
                self.release(node_index).await;
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        node_index: u32,
        ledger: &mut Provisioned,
    ) -> Result<ProcessPair, PairError> {
        let mut state = PairState::Uninitialized;

        let network = self.resolve_network().await?;
        self.transition(node_index, &mut state, PairState::NetworkReady)?;

        let volume_owned = self.config.volume.scope == VolumeScope::PerNode;
        let volume_name = self.config.volume_name(node_index);
        let volume = match self.find_volume(&volume_name).await? {
            Some(volume) => volume,
            None => {
                // Recorded before the call so a cancelled create still removes it.
                if volume_owned {
                    ledger.volume = Some(volume_name.clone());
                }
                self.create_volume(node_index, &volume_name).await?
            }
        };
        self.transition(node_index, &mut state, PairState::VolumeReady)?;

        let engine = if self.config.engine.enabled {
            self.transition(node_index, &mut state, PairState::EngineStarting)?;
            let spec = self.engine_spec(node_index, &network, &volume);
            let handle = self.launch(&spec, None, ledger).await?;
            self.await_engine_socket(&handle).await?;
            self.transition(node_index, &mut state, PairState::EngineRunning)?;
            Some(handle)
        } else {
            tracing::debug!(target: "forge::pair", node_index, "Engine pairing disabled");
            None
        };

        self.transition(node_index, &mut state, PairState::NodeStarting)?;
        let spec = self.node_spec(node_index, &network, &volume);
        let script = self.start_script.clone();
        let node = self.launch(&spec, Some(&script), ledger).await?;
        self.transition(node_index, &mut state, PairState::NodeRunning)?;

        Ok(ProcessPair {
            node_index,
            network,
            volume: Some(volume),
            volume_owned,
            node: Some(node),
            engine,
            credentials: ValidatorCredentials::new(
                self.config.validator.public_key.clone(),
                self.config.validator.private_key.clone(),
            ),
            state,
            strategy: StartupStrategy::Direct,
            tool: None,
        })
    }

    async fn rollback(&self, ledger: Provisioned, cancelled: bool) {
        for handle in ledger.containers.iter().rev() {
            self.stop_and_remove(handle).await;
        }
        // A cancelled create may have reached the runtime without being acknowledged.
        if cancelled {
            for name in &ledger.pending {
                if let Ok(Some(handle)) = self.runtime.find_container(name).await {
                    self.stop_and_remove(&handle).await;
                }
            }
        }
        if let Some(volume) = &ledger.volume {
            self.remove_volume(volume).await;
        }
        tracing::info!(
            target: "forge::pair",
            containers = ledger.containers.len(),
            volume = ?ledger.volume,
            "Rolled back partially created pair; shared network retained"
        );
    }

    /// Runs the external tool's `node-<N>/up` target in `tool_dir` and adopts
    /// the containers it started.
    ///
    /// Validator keys are scraped from the tool's stdout. If an expected
    /// container is missing afterwards the call fails with `ProcessNotFound`,
    /// after running the `down` target and removing whatever was found.
    pub async fn create_via_external_tool(
        &self,
        node_index: u32,
        tool_dir: &Path,
    ) -> Result<ProcessPair, PairError> {
        self.reserve(node_index).await?;
        let tool = ExternalTool::from_config(&self.config.external_tool, tool_dir);
        let result = self.adopt_from_tool(node_index, tool).await;
        if let Err(e) = &result {
            tracing::warn!(target: "forge::pair", node_index, error = %e, "External tool bring-up failed");
            self.release(node_index).await;
        }
        result
    }

    async fn adopt_from_tool(
        &self,
        node_index: u32,
        tool: ExternalTool,
    ) -> Result<ProcessPair, PairError> {
        let output = tool.up(node_index).await?;
        let parser = CredentialParser::new(self.config.external_tool.parse_policy);

        let adopted = match parser.parse(&output.stdout) {
            Ok(credentials) => self
                .lookup_pair(node_index)
                .await
                .map(|pair| (pair, credentials)),
            Err(e) => Err(e),
        };

        match adopted {
            Ok((mut pair, credentials)) => {
                pair.credentials = credentials;
                pair.strategy = StartupStrategy::ExternalTool;
                pair.volume_owned = false;
                pair.tool = Some(tool);
                Ok(pair)
            }
            Err(e) => {
                self.abandon_tool_pair(node_index, &tool).await;
                Err(e)
            }
        }
    }

    async fn abandon_tool_pair(&self, node_index: u32, tool: &ExternalTool) {
        if let Err(e) = tool.down(node_index).await {
            tracing::warn!(target: "forge::pair", node_index, error = %e, "Down target failed during cleanup");
        }
        for name in [
            node_container_name(node_index),
            engine_container_name(node_index),
        ] {
            if let Ok(Some(handle)) = self.runtime.find_container(&name).await {
                self.stop_and_remove(&handle).await;
            }
        }
    }

    /// Rebuilds a `ProcessPair` from containers running under the well-known names.
    ///
    /// Every expected container must exist. With `tool_dir` set, shutting the
    /// pair down also runs the tool's `down` target.
    pub async fn attach(
        &self,
        node_index: u32,
        tool_dir: Option<&Path>,
    ) -> Result<ProcessPair, PairError> {
        self.attach_with(node_index, tool_dir, false).await
    }

    /// Like `attach`, but adopts whichever of the two containers still exists.
    ///
    /// Meant for tearing down a half-present pair. Fails with `ProcessNotFound`
    /// only when neither container exists.
    pub async fn attach_remains(
        &self,
        node_index: u32,
        tool_dir: Option<&Path>,
    ) -> Result<ProcessPair, PairError> {
        self.attach_with(node_index, tool_dir, true).await
    }

    async fn attach_with(
        &self,
        node_index: u32,
        tool_dir: Option<&Path>,
        partial: bool,
    ) -> Result<ProcessPair, PairError> {
        self.reserve(node_index).await?;
        let found = if partial {
            self.lookup_remains(node_index).await
        } else {
            self.lookup_pair(node_index).await
        };
        match found {
            Ok(mut pair) => {
                if let Some(dir) = tool_dir {
                    pair.strategy = StartupStrategy::ExternalTool;
                    pair.volume_owned = false;
                    pair.tool = Some(ExternalTool::from_config(
                        &self.config.external_tool,
                        dir,
                    ));
                }
                Ok(pair)
            }
            Err(e) => {
                self.release(node_index).await;
                Err(e)
            }
        }
    }

    async fn find_named(&self, name: &str) -> Result<Option<ContainerHandle>, PairError> {
        self.runtime
            .find_container(name)
            .await
            .map_err(|e| PairError::provisioning(format!("container {}", name), e))
    }

    async fn lookup_pair(&self, node_index: u32) -> Result<ProcessPair, PairError> {
        let node_name = node_container_name(node_index);
        let node = self
            .find_named(&node_name)
            .await?
            .ok_or(PairError::ProcessNotFound(node_name))?;
        let engine = if self.config.engine.enabled {
            let engine_name = engine_container_name(node_index);
            Some(
                self.find_named(&engine_name)
                    .await?
                    .ok_or(PairError::ProcessNotFound(engine_name))?,
            )
        } else {
            None
        };
        self.assemble(node_index, Some(node), engine).await
    }

    async fn lookup_remains(&self, node_index: u32) -> Result<ProcessPair, PairError> {
        let node_name = node_container_name(node_index);
        let node = self.find_named(&node_name).await?;
        let engine = self.find_named(&engine_container_name(node_index)).await?;
        if node.is_none() && engine.is_none() {
            return Err(PairError::ProcessNotFound(node_name));
        }
        self.assemble(node_index, node, engine).await
    }

    async fn assemble(
        &self,
        node_index: u32,
        node: Option<ContainerHandle>,
        engine: Option<ContainerHandle>,
    ) -> Result<ProcessPair, PairError> {
        let network_name = &self.config.network_name;
        let network = self
            .runtime
            .find_network(network_name)
            .await
            .map_err(|e| PairError::provisioning(format!("network {}", network_name), e))?
            .ok_or_else(|| PairError::Provisioning {
                resource: format!("network {}", network_name),
                reason: "expected network does not exist".to_string(),
            })?;
        let volume = self.find_volume(&self.config.volume_name(node_index)).await?;
        let state = if node.is_some() {
            PairState::NodeRunning
        } else {
            PairState::EngineRunning
        };

        Ok(ProcessPair {
            node_index,
            network,
            volume,
            volume_owned: self.config.volume.scope == VolumeScope::PerNode,
            node,
            engine,
            credentials: ValidatorCredentials::new(
                self.config.validator.public_key.clone(),
                self.config.validator.private_key.clone(),
            ),
            state,
            strategy: StartupStrategy::Direct,
            tool: None,
        })
    }

    /// Decoded log text of one process, or `None` if the pair has no such handle.
    pub async fn logs(
        &self,
        pair: &ProcessPair,
        which: ProcessKind,
    ) -> Result<Option<String>, PairError> {
        let Some(handle) = pair.handle(which) else {
            return Ok(None);
        };
        match self.runtime.logs(&handle.id).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Runtime status of one process of the pair, looked up by its well-known name.
    pub async fn status(
        &self,
        pair: &ProcessPair,
        which: ProcessKind,
    ) -> Result<ContainerStatus, PairError> {
        let key = pair
            .handle(which)
            .map(|h| h.id.clone())
            .unwrap_or_else(|| which.container_name(pair.node_index));
        Ok(self.runtime.container_status(&key).await?)
    }

    /// Stops and removes both processes of the pair. Never fails; safe to repeat.
    pub async fn shutdown(&self, pair: &mut ProcessPair) {
        if pair.state == PairState::Terminated {
            tracing::debug!(target: "forge::pair", node_index = pair.node_index, "Pair already terminated");
            return;
        }
        if pair.state.can_transition_to(PairState::ShuttingDown) {
            pair.state = PairState::ShuttingDown;
        }

        for handle in [pair.node.take(), pair.engine.take()].into_iter().flatten() {
            self.stop_and_remove(&handle).await;
        }
        if pair.volume_owned {
            if let Some(volume) = &pair.volume {
                self.remove_volume(&volume.name).await;
            }
        }
        if let Some(tool) = pair.tool.take() {
            if let Err(e) = tool.down(pair.node_index).await {
                tracing::warn!(target: "forge::pair", node_index = pair.node_index, error = %e, "Down target failed");
            }
        }

        pair.state = PairState::Terminated;
        self.release(pair.node_index).await;
        tracing::info!(target: "forge::pair", node_index = pair.node_index, "Pair shut down");
    }

    async fn stop_and_remove(&self, handle: &ContainerHandle) {
        if let Err(e) = self.runtime.stop_container(&handle.id).await {
            if !e.is_not_found() {
                tracing::warn!(target: "forge::pair", container = %handle.name, error = %e, "Failed to stop container");
            }
        }
        if let Err(e) = self.runtime.remove_container(&handle.id).await {
            if !e.is_not_found() {
                tracing::warn!(target: "forge::pair", container = %handle.name, error = %e, "Failed to remove container");
            }
        }
    }

    async fn remove_volume(&self, name: &str) {
        if let Err(e) = self.runtime.remove_volume(name).await {
            if !e.is_not_found() {
                tracing::warn!(target: "forge::pair", volume = %name, error = %e, "Failed to remove volume");
            }
        }
    }

    /// Removes the shared network once no pair is active.
    ///
    /// Returns `false` when pairs are still active or the network does not exist.
    pub async fn teardown_network(&self) -> Result<bool, PairError> {
        if !self.active.lock().await.is_empty() {
            return Ok(false);
        }
        match self.runtime.remove_network(&self.config.network_name).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
