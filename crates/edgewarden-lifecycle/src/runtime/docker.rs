// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker-backed container runtime.
//!
//! Containers are named after their element identifier, which is how
//! `get_container` finds an element's container after an agent restart.
//! Registry credentials provided via `login` are held and passed to the
//! engine on the next pull; the engine validates them there.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::ContainerStateStatusEnum;
use futures::StreamExt;
use tracing::{debug, info};

use super::traits::*;
use crate::element::{Element, Registry};
use crate::status::{ElementState, ElementStatus};

/// Container runtime backed by a Docker engine.
pub struct DockerRuntime {
    docker: Docker,
    credentials: Mutex<Option<DockerCredentials>>,
}

impl DockerRuntime {
    /// Connect to the engine at `endpoint`, or auto-detect when `None`.
    pub fn new(endpoint: Option<&str>) -> Result<Self> {
        let docker = match endpoint {
            Some(path) => Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::Connection(e.to_string()))?;

        Ok(Self {
            docker,
            credentials: Mutex::new(None),
        })
    }

    /// Verify the engine is reachable.
    pub async fn healthcheck(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        Ok(())
    }

    fn map_status(status: Option<ContainerStateStatusEnum>) -> ElementStatus {
        let (state, detail) = match status {
            Some(ContainerStateStatusEnum::RUNNING) => (ElementState::Running, "running"),
            Some(ContainerStateStatusEnum::RESTARTING) => (ElementState::Starting, "restarting"),
            Some(ContainerStateStatusEnum::CREATED) => (ElementState::Stopped, "created"),
            Some(ContainerStateStatusEnum::PAUSED) => (ElementState::Stopped, "paused"),
            Some(ContainerStateStatusEnum::REMOVING) => (ElementState::Stopped, "removing"),
            Some(ContainerStateStatusEnum::EXITED) => (ElementState::Stopped, "exited"),
            Some(ContainerStateStatusEnum::DEAD) => (ElementState::Stopped, "dead"),
            _ => (ElementState::Stopped, "unknown"),
        };
        ElementStatus::with_detail(state, detail)
    }
}

fn engine_error(container_id: &str, e: bollard::errors::Error) -> RuntimeError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container_id.to_string()),
        other => RuntimeError::Engine(other.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn get_container(&self, element_id: &str) -> Result<Option<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![element_id.to_string()]);
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;

        Ok(containers.into_iter().next().map(|c| ContainerSummary {
            id: c.id.unwrap_or_default(),
            image: c.image.unwrap_or_default(),
        }))
    }

    async fn get_container_status(&self, container_id: &str) -> Result<ElementStatus> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| engine_error(container_id, e))?;
        Ok(Self::map_status(inspect.state.and_then(|s| s.status)))
    }

    async fn create_container(&self, element: &Element, hostname: &str) -> Result<String> {
        let options = CreateContainerOptions {
            name: element.id.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(element.image.clone()),
            hostname: Some(hostname.to_string()),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;

        info!(element_id = %element.id, container_id = %created.id, "Container created");
        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| engine_error(container_id, e))
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.docker
            .stop_container(container_id, None::<StopContainerOptions>)
            .await
            .map_err(|e| engine_error(container_id, e))
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(container_id, Some(options))
            .await
            .map_err(|e| engine_error(container_id, e))
    }

    async fn has_container(&self, container_id: &str) -> Result<bool> {
        match self.docker.inspect_container(container_id, None).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(RuntimeError::Engine(e.to_string())),
        }
    }

    async fn get_container_ip_address(&self, container_id: &str) -> Result<Option<String>> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| engine_error(container_id, e))?;

        Ok(inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .and_then(|networks| {
                networks
                    .into_values()
                    .find_map(|endpoint| endpoint.ip_address.filter(|ip| !ip.is_empty()))
            }))
    }

    async fn login(&self, registry: &Registry) -> Result<()> {
        debug!(registry = %registry.name, url = %registry.url, "Holding registry credentials for pull");
        let credentials = DockerCredentials {
            username: Some(registry.user.clone()),
            password: Some(registry.password.clone()),
            serveraddress: Some(registry.url.clone()),
            ..Default::default()
        };
        *self.credentials.lock().unwrap() = Some(credentials);
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });
        let credentials = self.credentials.lock().unwrap().clone();

        let mut stream = self.docker.create_image(options, None, credentials);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| RuntimeError::Pull(format!("{image}: {e}")))?;
        }
        Ok(())
    }
}
