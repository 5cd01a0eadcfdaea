// Path: crates/forge/src/testing/docker.rs

use super::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus, NetworkHandle,
    RuntimeResult, VolumeHandle,
};
use async_trait::async_trait;
use bollard::{
    exec::{StartExecOptions, StartExecResults},
    models::{
        ContainerCreateBody, ContainerStateStatusEnum, ExecConfig, HostConfig,
        NetworkCreateRequest, VolumeCreateOptions,
    },
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
        ListContainersOptionsBuilder, ListNetworksOptions, LogsOptionsBuilder,
        RemoveContainerOptionsBuilder, RemoveVolumeOptions, StartContainerOptions,
        StopContainerOptionsBuilder, UploadToContainerOptionsBuilder,
    },
    Docker,
};
use bytes::Bytes;
use casperlabs_types::error::RuntimeError;
use futures_util::StreamExt;
use http_body_util::{Either, Full};

/// Seconds Docker waits after SIGTERM before killing a container on stop.
const STOP_GRACE_SECS: i32 = 5;

fn map_err(err: bollard::errors::Error) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict(message),
        other => RuntimeError::Api(other.to_string()),
    }
}

/// `ContainerRuntime` backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using `DOCKER_HOST` or the platform's default socket.
    pub fn connect() -> RuntimeResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(map_err)?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find_network(&self, name: &str) -> RuntimeResult<Option<NetworkHandle>> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions>)
            .await
            .map_err(map_err)?;
        Ok(networks.into_iter().find_map(|net| {
            match (net.name, net.id) {
                (Some(n), Some(id)) if n == name => Some(NetworkHandle { id, name: n }),
                _ => None,
            }
        }))
    }

    async fn create_network(&self, name: &str) -> RuntimeResult<NetworkHandle> {
        let network = self
            .docker
            .create_network(NetworkCreateRequest {
                name: name.to_string(),
                internal: Some(false),
                ..Default::default()
            })
            .await
            .map_err(map_err)?;
        if network.id.is_empty() {
            return Err(RuntimeError::Api(format!(
                "network '{}' was created without an ID",
                name
            )));
        }
        Ok(NetworkHandle {
            id: network.id,
            name: name.to_string(),
        })
    }

    async fn remove_network(&self, name: &str) -> RuntimeResult<()> {
        self.docker.remove_network(name).await.map_err(map_err)
    }

    async fn find_volume(&self, name: &str) -> RuntimeResult<Option<VolumeHandle>> {
        match self.docker.inspect_volume(name).await {
            Ok(volume) => Ok(Some(VolumeHandle { name: volume.name })),
            Err(e) => match map_err(e) {
                RuntimeError::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create_volume(&self, name: &str) -> RuntimeResult<VolumeHandle> {
        let volume = self
            .docker
            .create_volume(VolumeCreateOptions {
                name: Some(name.to_string()),
                ..Default::default()
            })
            .await
            .map_err(map_err)?;
        Ok(VolumeHandle { name: volume.name })
    }

    async fn remove_volume(&self, name: &str) -> RuntimeResult<()> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(map_err)
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => match map_err(e) {
                RuntimeError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let options = CreateImageOptionsBuilder::default().from_image(image).build();
        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(chunk) = pull_stream.next().await {
            let info = chunk.map_err(map_err)?;
            if let Some(status) = info.status {
                tracing::debug!(target: "forge::docker", image, "{}", status);
            }
            if let Some(detail) = info.error_detail {
                return Err(RuntimeError::Api(format!(
                    "pull of '{}' failed: {}",
                    image,
                    detail.message.unwrap_or_default()
                )));
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> RuntimeResult<ContainerHandle> {
        let options = Some(CreateContainerOptionsBuilder::default().name(&spec.name).build());
        let host_config = HostConfig {
            network_mode: Some(spec.network.clone()),
            binds: Some(spec.mounts.iter().map(|m| m.to_bind()).collect()),
            ..Default::default()
        };
        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            hostname: Some(spec.hostname.clone()),
            user: spec.user.clone(),
            env: Some(spec.env_pairs()),
            entrypoint: spec.entrypoint.clone(),
            cmd: spec.cmd.clone(),
            working_dir: spec.working_dir.clone(),
            host_config: Some(host_config),
            ..Default::default()
        };

        let id = self
            .docker
            .create_container(options, config)
            .await
            .map_err(map_err)?
            .id;
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
        let options = UploadToContainerOptionsBuilder::default()
            .path(dest_dir)
            .build();
        let body = Either::Left(Full::new(Bytes::from(tar)));
        self.docker
            .upload_to_container(container, Some(options), body)
            .await
            .map_err(map_err)
    }

    async fn start_container(&self, container: &str) -> RuntimeResult<()> {
        self.docker
            .start_container(container, None::<StartContainerOptions>)
            .await
            .map_err(map_err)
    }

    async fn stop_container(&self, container: &str) -> RuntimeResult<()> {
        let options = StopContainerOptionsBuilder::default()
            .t(STOP_GRACE_SECS)
            .build();
        match self.docker.stop_container(container, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn remove_container(&self, container: &str) -> RuntimeResult<()> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        self.docker
            .remove_container(container, Some(options))
            .await
            .map_err(map_err)
    }

    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ContainerHandle>> {
        let options = ListContainersOptionsBuilder::default().all(true).build();
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_err)?;
        let wanted = format!("/{}", name);

        for summary in containers {
            let matches = summary
                .names
                .as_ref()
                .is_some_and(|names| names.iter().any(|n| n == &wanted || n == name));
            if !matches {
                continue;
            }
            let Some(id) = summary.id else {
                continue;
            };
            let network = summary
                .network_settings
                .and_then(|s| s.networks)
                .and_then(|nets| nets.into_keys().next());
            let volume = summary
                .mounts
                .and_then(|mounts| mounts.into_iter().find_map(|m| m.name));
            return Ok(Some(ContainerHandle {
                id,
                name: name.to_string(),
                network,
                volume,
            }));
        }
        Ok(None)
    }

    async fn container_status(&self, container: &str) -> RuntimeResult<ContainerStatus> {
        let inspect = match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(e) => {
                return match map_err(e) {
                    RuntimeError::NotFound(_) => Ok(ContainerStatus::Removed),
                    other => Err(other),
                }
            }
        };
        let state = inspect.state.unwrap_or_default();
        if state.running.unwrap_or(false) {
            return Ok(ContainerStatus::Running);
        }
        Ok(match state.status {
            Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
            Some(ContainerStateStatusEnum::REMOVING) => ContainerStatus::Removed,
            _ => ContainerStatus::Exited,
        })
    }

    async fn path_exists(&self, container: &str, path: &str) -> RuntimeResult<bool> {
        let exec = self
            .docker
            .create_exec(
                container,
                ExecConfig {
                    cmd: Some(vec!["test".to_string(), "-e".to_string(), path.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(map_err)?;

        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .map_err(map_err)?
        {
            while let Some(chunk) = output.next().await {
                chunk.map_err(map_err)?;
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await.map_err(map_err)?;
        Ok(inspect.exit_code == Some(0))
    }

    async fn logs(&self, container: &str) -> RuntimeResult<String> {
        let options = LogsOptionsBuilder::default()
            .stdout(true)
            .stderr(true)
            .build();
        let mut stream = self.docker.logs(container, Some(options));
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk.map_err(map_err)?.to_string());
        }
        Ok(text)
    }
}
