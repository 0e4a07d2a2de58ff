// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-element reconciliation loop.
//!
//! One supervisor per declared element, each on its own fixed-interval
//! timer. A tick compares declared state (catalog) with observed state
//! (engine) and corrects drift. The tick is idempotent and its side
//! effects are ordered so that a crash between any two steps leaves the
//! element in a state the next tick can still reconcile.
//!
//! Failure containment: nothing escapes a tick. Create failures record
//! `FAILED_VERIFICATION` and propagate only as far as the tick loop;
//! start failures record `STOPPED` and do not propagate at all; stop is
//! best-effort; inspection failures enqueue an `Update` task so the next
//! tick takes the rebuild path instead of looping on the same error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::element::{Element, ElementCatalog};
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use crate::status::{ElementState, ElementStatus, StatusRegistry};
use crate::task::{ContainerTask, TaskKind, TaskQueue};

/// Default reconciliation interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often to reconcile.
    pub tick_interval: Duration,
    /// Host-identity-derived hostname given to created containers.
    pub hostname: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            hostname: "edgewarden".to_string(),
        }
    }
}

/// First action of a tick, decided from observed facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// No container is known: adopt an existing one or create and start.
    Materialize,
    /// The pending intent asks for teardown (rebuild or removal).
    TearDown,
    /// Steady state: inspect the container and self-heal.
    Inspect,
}

/// Decide what a tick must do, given the element's observed facts.
///
/// Pure over its inputs so the transition logic is testable without an
/// engine. Returns the (possibly corrected) task along with the action:
/// an element missing from the catalog always converts the task to
/// `Remove`.
pub fn plan(in_catalog: bool, task: TaskKind, has_container: bool) -> (TaskKind, TickAction) {
    let task = if in_catalog { task } else { TaskKind::Remove };
    let action = if !has_container {
        if task == TaskKind::Remove {
            // Nothing to adopt or create; teardown is a cheap no-op that
            // keeps the removal converged.
            TickAction::TearDown
        } else {
            TickAction::Materialize
        }
    } else if task != TaskKind::Add {
        TickAction::TearDown
    } else {
        TickAction::Inspect
    };
    (task, action)
}

/// Reconciliation loop for one element.
pub struct ElementSupervisor {
    element_id: String,
    catalog: Arc<ElementCatalog>,
    runtime: Arc<dyn ContainerRuntime>,
    status: Arc<StatusRegistry>,
    tasks: Arc<TaskQueue>,
    config: SupervisorConfig,
    task: TaskKind,
    container_id: Option<String>,
    shutdown: Arc<Notify>,
}

impl ElementSupervisor {
    /// Create a supervisor for one element.
    pub fn new(
        element_id: impl Into<String>,
        catalog: Arc<ElementCatalog>,
        runtime: Arc<dyn ContainerRuntime>,
        status: Arc<StatusRegistry>,
        tasks: Arc<TaskQueue>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            catalog,
            runtime,
            status,
            tasks,
            config,
            task: TaskKind::Add,
            container_id: None,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Ask the supervisor to tear the container down and stop managing
    /// the element. Consumed by the next tick.
    pub fn remove(&self) {
        self.tasks.add_task(ContainerTask::new(
            TaskKind::Remove,
            &self.element_id,
            self.container_id.clone(),
        ));
    }

    /// Ask the supervisor to tear the container down and rebuild it.
    /// Consumed by the next tick.
    pub fn update(&self) {
        self.tasks.add_task(ContainerTask::new(
            TaskKind::Update,
            &self.element_id,
            self.container_id.clone(),
        ));
    }

    /// Run the reconciliation loop until shutdown or element removal.
    pub async fn run(mut self) {
        info!(
            element_id = %self.element_id,
            tick_interval_secs = self.config.tick_interval.as_secs(),
            "Element supervisor started"
        );

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => {
                    info!(element_id = %self.element_id, "Element supervisor received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.tick_interval) => {
                    self.tick().await;
                    if self.is_removed() {
                        info!(element_id = %self.element_id, "Element removed, supervisor stopping");
                        break;
                    }
                }
            }
        }

        info!(element_id = %self.element_id, "Element supervisor stopped");
    }

    /// Whether the element has converged to its removed terminal state.
    pub fn is_removed(&self) -> bool {
        self.task == TaskKind::Remove
            && self.container_id.is_none()
            && self.catalog.get(&self.element_id).is_none()
    }

    /// One reconciliation pass. Never lets a failure escape.
    pub async fn tick(&mut self) {
        if let Some(pending) = self.tasks.take(&self.element_id) {
            debug!(element_id = %self.element_id, kind = ?pending.kind, "Draining pending task");
            self.task = pending.kind;
            if self.container_id.is_none() {
                self.container_id = pending.container_id;
            }
        }

        let in_catalog = self.catalog.get(&self.element_id).is_some();
        loop {
            let (task, action) = plan(in_catalog, self.task, self.container_id.is_some());
            self.task = task;
            match action {
                TickAction::Materialize => match self.runtime.get_container(&self.element_id).await
                {
                    Ok(Some(existing)) => {
                        info!(
                            element_id = %self.element_id,
                            container_id = %existing.id,
                            "Adopted existing container"
                        );
                        self.container_id = Some(existing.id);
                        // Re-plan with the adopted container.
                    }
                    Ok(None) => {
                        if self.create().await.is_err() {
                            // Status already records the failure; the
                            // next tick retries.
                            return;
                        }
                        self.start().await;
                        self.task = TaskKind::Add;
                        // Re-plan: inspect the fresh container.
                    }
                    Err(e) => {
                        warn!(element_id = %self.element_id, error = %e, "Engine lookup failed");
                        return;
                    }
                },
                TickAction::TearDown => {
                    self.tear_down().await;
                    return;
                }
                TickAction::Inspect => {
                    self.inspect().await;
                    return;
                }
            }
        }
    }

    /// Resolve registry credentials, pull the image, create the
    /// container, and record its identity on the element.
    ///
    /// Fails fast when the registry is unknown. Any failure records
    /// `FAILED_VERIFICATION` and propagates to the tick loop, which
    /// suppresses it.
    async fn create(&mut self) -> Result<()> {
        let element = self
            .catalog
            .get(&self.element_id)
            .ok_or_else(|| Error::ElementNotFound(self.element_id.clone()))?;

        let Some(registry) = self.catalog.registry(&element.registry) else {
            warn!(
                element_id = %self.element_id,
                registry = %element.registry,
                "Registry not found"
            );
            return Err(Error::RegistryNotFound(element.registry.clone()));
        };
        if let Err(e) = self.runtime.login(&registry).await {
            warn!(element_id = %self.element_id, error = %e, "Engine login failed");
            return Err(e.into());
        }

        self.set_status(ElementStatus::new(ElementState::Building));

        match self.build(&element).await {
            Ok(observed) => {
                info!(
                    element_id = %self.element_id,
                    container_id = ?self.container_id,
                    "Container created"
                );
                self.set_status(observed);
                Ok(())
            }
            Err(e) => {
                warn!(element_id = %self.element_id, error = %e, "Container build failed");
                self.set_status(ElementStatus::with_detail(
                    ElementState::FailedVerification,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn build(&mut self, element: &Element) -> Result<ElementStatus> {
        info!(element_id = %self.element_id, image = %element.image, "Pulling image");
        self.runtime.pull_image(&element.image).await?;
        debug!(image = %element.image, "Image pulled");

        let container_id = self
            .runtime
            .create_container(element, &self.config.hostname)
            .await?;
        let container_ip = self.runtime.get_container_ip_address(&container_id).await?;
        self.catalog
            .record_container(&self.element_id, &container_id, container_ip);

        let observed = self.runtime.get_container_status(&container_id).await?;
        self.container_id = Some(container_id);
        Ok(observed)
    }

    /// Start the container. Failure here is the self-healing path: it is
    /// recorded as `STOPPED`, not retried synchronously, and never
    /// propagated.
    async fn start(&mut self) {
        let Some(container_id) = self.container_id.clone() else {
            return;
        };
        self.set_status(ElementStatus::new(ElementState::Starting));
        info!(element_id = %self.element_id, "Starting container");

        match self.runtime.start_container(&container_id).await {
            Ok(()) => {
                info!(element_id = %self.element_id, "Container started");
                self.set_status(ElementStatus::new(ElementState::Running));
            }
            Err(e) => {
                warn!(element_id = %self.element_id, error = %e, "Container start failed");
                self.set_status(ElementStatus::with_detail(
                    ElementState::Stopped,
                    e.to_string(),
                ));
            }
        }
    }

    /// Stop the container, best-effort.
    async fn stop(&self) {
        let Some(container_id) = &self.container_id else {
            return;
        };
        info!(element_id = %self.element_id, "Stopping container");
        if let Err(e) = self.runtime.stop_container(container_id).await {
            warn!(element_id = %self.element_id, error = %e, "Error stopping container");
        }
    }

    /// Remove the container from the engine. A no-op when the engine no
    /// longer knows it; removal failure propagates to the caller.
    async fn delete(&self) -> Result<()> {
        let Some(container_id) = &self.container_id else {
            return Ok(());
        };
        if !self.runtime.has_container(container_id).await? {
            return Ok(());
        }
        info!(element_id = %self.element_id, "Removing container");
        self.runtime.remove_container(container_id).await?;
        Ok(())
    }

    async fn tear_down(&mut self) {
        self.stop().await;
        match self.delete().await {
            Ok(()) => {
                self.container_id = None;
                self.catalog.clear_container(&self.element_id);
                debug!(element_id = %self.element_id, "Container torn down");
            }
            Err(e) => {
                // Keep the container id so the next tick retries the
                // teardown.
                warn!(element_id = %self.element_id, error = %e, "Container removal failed");
            }
        }
    }

    /// Record the observed status and restart a container that drifted
    /// out of the running state. Inspection failure enqueues an `Update`
    /// so the next tick forces the rebuild path.
    async fn inspect(&mut self) {
        let Some(container_id) = self.container_id.clone() else {
            return;
        };
        match self.runtime.get_container_status(&container_id).await {
            Ok(observed) => {
                self.set_status(observed.clone());
                if observed.state != ElementState::Running {
                    info!(
                        element_id = %self.element_id,
                        observed = %observed.state,
                        "Container is not running, restarting"
                    );
                    self.start().await;
                    match self.runtime.get_container_status(&container_id).await {
                        Ok(after) => self.set_status(after),
                        Err(e) => {
                            warn!(element_id = %self.element_id, error = %e, "Re-inspection failed");
                            self.force_rebuild(container_id);
                        }
                    }
                }
            }
            Err(e) => {
                warn!(element_id = %self.element_id, error = %e, "Inspection failed, forcing rebuild");
                self.force_rebuild(container_id);
            }
        }
    }

    fn force_rebuild(&self, container_id: String) {
        self.tasks.add_task(ContainerTask::new(
            TaskKind::Update,
            &self.element_id,
            Some(container_id),
        ));
    }

    fn set_status(&self, status: ElementStatus) {
        self.status.set_element_status(&self.element_id, status);
    }
}
