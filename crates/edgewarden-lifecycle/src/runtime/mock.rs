// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock runtime for testing.
//!
//! An in-memory engine double that records every call and supports
//! failure injection per operation, so reconciliation logic can be
//! exercised without a real container engine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::*;
use crate::element::{Element, Registry};
use crate::status::{ElementState, ElementStatus};

#[derive(Debug, Clone)]
struct MockContainer {
    element_id: String,
    image: String,
    state: ElementState,
}

#[derive(Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    next_id: u64,
    calls: Vec<String>,
}

/// Mock container engine for testing.
#[derive(Default)]
pub struct MockRuntime {
    inner: Mutex<MockState>,
    /// If true, `login` fails.
    pub fail_login: bool,
    /// If true, `pull_image` fails.
    pub fail_pull: bool,
    /// If true, `start_container` fails.
    pub fail_start: bool,
    /// If true, `get_container_status` fails.
    pub fail_inspect: bool,
    /// If true, `remove_container` fails.
    pub fail_remove: bool,
}

impl MockRuntime {
    /// Create a mock engine where every operation succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock engine whose starts fail.
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Create a mock engine whose pulls fail.
    pub fn failing_pull() -> Self {
        Self {
            fail_pull: true,
            ..Self::default()
        }
    }

    /// Create a mock engine whose inspections fail.
    pub fn failing_inspect() -> Self {
        Self {
            fail_inspect: true,
            ..Self::default()
        }
    }

    /// Seed a running container for an element, as if created by a
    /// previous agent run. Returns the container id.
    pub fn seed_container(&self, element_id: &str, image: &str) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let container_id = format!("mock-{}", inner.next_id);
        inner.containers.insert(
            container_id.clone(),
            MockContainer {
                element_id: element_id.to_string(),
                image: image.to_string(),
                state: ElementState::Running,
            },
        );
        container_id
    }

    /// Force a container into a state, simulating external interference.
    pub fn set_container_state(&self, container_id: &str, state: ElementState) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(container) = inner.containers.get_mut(container_id) {
            container.state = state;
        }
    }

    /// Every engine call made so far, in order, by operation name.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of calls to one operation.
    pub fn call_count(&self, operation: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.iter().filter(|c| *c == operation).count()
    }

    /// Number of containers the engine currently knows.
    pub fn container_count(&self) -> usize {
        self.inner.lock().unwrap().containers.len()
    }

    fn record(&self, operation: &str) {
        self.inner.lock().unwrap().calls.push(operation.to_string());
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn runtime_type(&self) -> &'static str {
        "mock"
    }

    async fn get_container(&self, element_id: &str) -> Result<Option<ContainerSummary>> {
        self.record("get_container");
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .iter()
            .find(|(_, c)| c.element_id == element_id)
            .map(|(id, c)| ContainerSummary {
                id: id.clone(),
                image: c.image.clone(),
            }))
    }

    async fn get_container_status(&self, container_id: &str) -> Result<ElementStatus> {
        self.record("get_container_status");
        if self.fail_inspect {
            return Err(RuntimeError::Engine("inspect failed".to_string()));
        }
        let inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        Ok(ElementStatus::with_detail(
            container.state,
            container.state.to_string().to_lowercase(),
        ))
    }

    async fn create_container(&self, element: &Element, _hostname: &str) -> Result<String> {
        self.record("create_container");
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let container_id = format!("mock-{}", inner.next_id);
        inner.containers.insert(
            container_id.clone(),
            MockContainer {
                element_id: element.id.clone(),
                image: element.image.clone(),
                state: ElementState::Stopped,
            },
        );
        Ok(container_id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.record("start_container");
        if self.fail_start {
            return Err(RuntimeError::Engine("start failed".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        container.state = ElementState::Running;
        Ok(())
    }

    async fn stop_container(&self, container_id: &str) -> Result<()> {
        self.record("stop_container");
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        container.state = ElementState::Stopped;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        self.record("remove_container");
        if self.fail_remove {
            return Err(RuntimeError::Engine("remove failed".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner
            .containers
            .remove(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        Ok(())
    }

    async fn has_container(&self, container_id: &str) -> Result<bool> {
        self.record("has_container");
        let inner = self.inner.lock().unwrap();
        Ok(inner.containers.contains_key(container_id))
    }

    async fn get_container_ip_address(&self, container_id: &str) -> Result<Option<String>> {
        self.record("get_container_ip_address");
        let inner = self.inner.lock().unwrap();
        if inner.containers.contains_key(container_id) {
            Ok(Some("172.17.0.2".to_string()))
        } else {
            Err(RuntimeError::NotFound(container_id.to_string()))
        }
    }

    async fn login(&self, registry: &Registry) -> Result<()> {
        self.record("login");
        if self.fail_login {
            return Err(RuntimeError::Auth(registry.name.clone()));
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record("pull_image");
        if self.fail_pull {
            return Err(RuntimeError::Pull(image.to_string()));
        }
        Ok(())
    }
}
