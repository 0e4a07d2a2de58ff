// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the edgewarden agent.
//!
//! [`AgentRuntime`] wires the message subsystem (bus, subscriber table,
//! real-time server, query endpoint) and the lifecycle subsystem (catalog,
//! status registry, task queue, one supervisor per element) into a running
//! set of tokio tasks, with graceful shutdown.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use edgewarden_agent::config::Config;
//! use edgewarden_agent::runtime::AgentRuntime;
//! use edgewarden_lifecycle::runtime::DockerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let engine = Arc::new(DockerRuntime::new(config.engine_url.as_deref())?);
//!
//!     let runtime = AgentRuntime::builder()
//!         .config(config)
//!         .container_runtime(engine)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use edgewarden_core::bus::MessageBus;
use edgewarden_core::delivery::SubscriberTable;
use edgewarden_core::{query_api, realtime};
use edgewarden_lifecycle::element::{Element, ElementCatalog, Registry};
use edgewarden_lifecycle::runtime::ContainerRuntime;
use edgewarden_lifecycle::status::StatusRegistry;
use edgewarden_lifecycle::supervisor::{ElementSupervisor, SupervisorConfig};
use edgewarden_lifecycle::task::TaskQueue;

use crate::config::Config;

/// Name of the registry declared from agent configuration.
const DEFAULT_REGISTRY: &str = "default";

/// Builder for creating an [`AgentRuntime`].
#[derive(Default)]
pub struct AgentRuntimeBuilder {
    config: Option<Config>,
    container_runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl AgentRuntimeBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the container engine client (required).
    pub fn container_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.container_runtime = Some(runtime);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<AgentRuntimeConfig> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("config is required"))?;
        let container_runtime = self
            .container_runtime
            .ok_or_else(|| anyhow::anyhow!("container_runtime is required"))?;
        Ok(AgentRuntimeConfig {
            config,
            container_runtime,
        })
    }
}

/// Configuration for an [`AgentRuntime`], ready to start.
pub struct AgentRuntimeConfig {
    config: Config,
    container_runtime: Arc<dyn ContainerRuntime>,
}

impl AgentRuntimeConfig {
    /// Start the runtime, spawning the servers and element supervisors.
    pub async fn start(self) -> Result<AgentRuntime> {
        let subscribers = Arc::new(SubscriberTable::new(self.config.retry_limit));
        let bus = Arc::new(MessageBus::new(subscribers.clone(), self.config.retention));
        let status = Arc::new(StatusRegistry::new());
        let tasks = Arc::new(TaskQueue::new());

        let catalog = Arc::new(ElementCatalog::new());
        catalog.insert_registry(Registry {
            name: DEFAULT_REGISTRY.to_string(),
            url: self.config.registry_url.clone(),
            user: self.config.registry_user.clone(),
            password: self.config.registry_password.clone(),
        });
        for spec in &self.config.elements {
            catalog.insert(Element::new(&spec.id, &spec.image, DEFAULT_REGISTRY));
        }

        let realtime_shutdown = Arc::new(Notify::new());
        let realtime_handle = tokio::spawn(realtime::run_realtime_server(
            self.config.realtime_addr,
            bus.clone(),
            subscribers.clone(),
            realtime_shutdown.clone(),
        ));

        let query_shutdown = Arc::new(Notify::new());
        let query_handle = tokio::spawn(query_api::run_query_server(
            self.config.query_addr,
            bus.clone(),
            query_shutdown.clone(),
        ));

        let supervisor_config = SupervisorConfig {
            tick_interval: self.config.tick_interval,
            hostname: self.config.container_hostname(),
        };

        let mut runtime = AgentRuntime {
            bus,
            subscribers,
            status,
            tasks,
            catalog,
            container_runtime: self.container_runtime,
            supervisor_config,
            realtime_shutdown,
            query_shutdown,
            realtime_handle,
            query_handle,
            supervisor_shutdowns: Vec::new(),
            supervisor_handles: Vec::new(),
        };

        for element_id in runtime.catalog.element_ids() {
            runtime.spawn_supervisor(&element_id);
        }

        info!(
            elements = runtime.supervisor_handles.len(),
            realtime_addr = %self.config.realtime_addr,
            query_addr = %self.config.query_addr,
            "AgentRuntime started"
        );

        Ok(runtime)
    }
}

/// A running edgewarden agent that can be embedded in an application.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct AgentRuntime {
    bus: Arc<MessageBus>,
    subscribers: Arc<SubscriberTable>,
    status: Arc<StatusRegistry>,
    tasks: Arc<TaskQueue>,
    catalog: Arc<ElementCatalog>,
    container_runtime: Arc<dyn ContainerRuntime>,
    supervisor_config: SupervisorConfig,
    realtime_shutdown: Arc<Notify>,
    query_shutdown: Arc<Notify>,
    realtime_handle: JoinHandle<edgewarden_core::Result<()>>,
    query_handle: JoinHandle<edgewarden_core::Result<()>>,
    supervisor_shutdowns: Vec<Arc<Notify>>,
    supervisor_handles: Vec<JoinHandle<()>>,
}

impl AgentRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new()
    }

    /// The message bus.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The subscriber binding table.
    pub fn subscribers(&self) -> &Arc<SubscriberTable> {
        &self.subscribers
    }

    /// The element status registry.
    pub fn status(&self) -> &Arc<StatusRegistry> {
        &self.status
    }

    /// The lifecycle task queue.
    pub fn task_queue(&self) -> &Arc<TaskQueue> {
        &self.tasks
    }

    /// The element catalog.
    pub fn catalog(&self) -> &Arc<ElementCatalog> {
        &self.catalog
    }

    /// Declare a new element and start supervising it.
    pub fn add_element(&mut self, element: Element) {
        let element_id = element.id.clone();
        self.catalog.insert(element);
        self.spawn_supervisor(&element_id);
    }

    fn spawn_supervisor(&mut self, element_id: &str) {
        let supervisor = ElementSupervisor::new(
            element_id,
            self.catalog.clone(),
            self.container_runtime.clone(),
            self.status.clone(),
            self.tasks.clone(),
            self.supervisor_config.clone(),
        );
        self.supervisor_shutdowns.push(supervisor.shutdown_handle());
        self.supervisor_handles.push(tokio::spawn(supervisor.run()));
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals every supervisor and both servers to stop, then waits for
    /// them to complete.
    pub async fn shutdown(self) -> Result<()> {
        info!("AgentRuntime shutting down...");

        for shutdown in &self.supervisor_shutdowns {
            shutdown.notify_one();
        }
        self.realtime_shutdown.notify_one();
        self.query_shutdown.notify_one();

        for handle in self.supervisor_handles {
            if let Err(e) = handle.await {
                error!("Supervisor task panicked: {}", e);
            }
        }

        match self.realtime_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Real-time server error during shutdown: {}", e),
            Err(e) => error!("Real-time server task panicked: {}", e),
        }

        match self.query_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Query server error during shutdown: {}", e),
            Err(e) => error!("Query server task panicked: {}", e),
        }

        info!("AgentRuntime shutdown complete");
        Ok(())
    }
}
