// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Container runtime trait definitions.
//!
//! Defines the abstract interface to the container engine. Supervisors
//! are written against this trait; the engine behind it (Docker, a test
//! double) is interchangeable. Every operation is fallible and failures
//! are errors, never silent wrong results.

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{Element, Registry};
use crate::status::ElementStatus;

/// Errors from container engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// Engine endpoint unreachable.
    #[error("Engine unreachable: {0}")]
    Connection(String),

    /// Container does not exist in the engine.
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Registry login failed.
    #[error("Registry login failed: {0}")]
    Auth(String),

    /// Image pull failed.
    #[error("Image pull failed: {0}")]
    Pull(String),

    /// Other engine failure.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Observed summary of an engine container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Engine-assigned container identifier.
    pub id: String,
    /// Image the container was created from.
    pub image: String,
}

/// Client interface to the container engine.
///
/// Implementations are PURE engine clients: they do not touch the element
/// catalog or the status registry. Recording observed state is the
/// supervisor's job.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime type identifier (e.g., "docker", "mock").
    fn runtime_type(&self) -> &'static str;

    /// Find the container belonging to an element, if one exists.
    async fn get_container(&self, element_id: &str) -> Result<Option<ContainerSummary>>;

    /// Observed lifecycle status of a container.
    async fn get_container_status(&self, container_id: &str) -> Result<ElementStatus>;

    /// Create a container for an element; returns the new container id.
    async fn create_container(&self, element: &Element, hostname: &str) -> Result<String>;

    /// Start a created or stopped container.
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Stop a running container.
    async fn stop_container(&self, container_id: &str) -> Result<()>;

    /// Remove a container from the engine.
    async fn remove_container(&self, container_id: &str) -> Result<()>;

    /// Whether the engine still knows the container.
    async fn has_container(&self, container_id: &str) -> Result<bool>;

    /// IP address assigned to a container, when one is.
    async fn get_container_ip_address(&self, container_id: &str) -> Result<Option<String>>;

    /// Authenticate against an image registry.
    async fn login(&self, registry: &Registry) -> Result<()>;

    /// Pull an image from the logged-in registry.
    async fn pull_image(&self, image: &str) -> Result<()>;
}
