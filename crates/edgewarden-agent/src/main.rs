// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Edgewarden Agent
//!
//! An edge-node agent responsible for:
//! - Keeping declared workloads running as containers (per-element
//!   reconciliation against the container engine)
//! - Relaying messages between workloads (message bus with real-time
//!   fan-out and historical range queries)

use std::sync::Arc;

use tracing::{info, warn};

use edgewarden_agent::config::Config;
use edgewarden_agent::runtime::AgentRuntime;
use edgewarden_lifecycle::runtime::DockerRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "edgewarden_agent=info,edgewarden_core=info,edgewarden_lifecycle=info".into()
            }),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        instance_id = %config.instance_id,
        realtime_addr = %config.realtime_addr,
        query_addr = %config.query_addr,
        elements = config.elements.len(),
        "Starting Edgewarden Agent"
    );

    // Connect to the container engine. A bad endpoint is a startup
    // failure; an unreachable engine is transient and left to the
    // supervisors to retry.
    let engine = Arc::new(DockerRuntime::new(config.engine_url.as_deref())?);
    if let Err(e) = engine.healthcheck().await {
        warn!(error = %e, "Container engine not reachable; supervisors will keep retrying");
    }

    // Start the runtime
    let runtime = AgentRuntime::builder()
        .config(config)
        .container_runtime(engine)
        .build()?
        .start()
        .await?;

    info!("Edgewarden Agent ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await?;

    info!("Edgewarden Agent shut down");

    Ok(())
}
