// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the edgewarden agent.
//!
//! Loaded once at startup from environment variables. Resource limit
//! fields are validated as positive numbers before the agent starts;
//! a bad value is a startup failure, the only kind allowed to terminate
//! the process.

use std::net::SocketAddr;
use std::time::Duration;

/// Declared element from configuration: identifier and image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    /// Element identifier.
    pub id: String,
    /// Image reference to run.
    pub image: String,
}

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instance identity, used to derive container hostnames.
    pub instance_id: String,
    /// Address of this host, used to derive container hostnames.
    pub host_address: String,
    /// Remote controller URL (reporting, element sync).
    pub controller_url: Option<String>,
    /// Remote controller certificate path.
    pub controller_cert: Option<String>,
    /// Container engine endpoint; auto-detected when unset.
    pub engine_url: Option<String>,
    /// Bind address for the real-time delivery server.
    pub realtime_addr: SocketAddr,
    /// Bind address for the historical query HTTP server.
    pub query_addr: SocketAddr,
    /// Reconciliation interval per element.
    pub tick_interval: Duration,
    /// Redelivery bound per subscriber connection.
    pub retry_limit: u32,
    /// Message log retention cap.
    pub retention: usize,
    /// Disk consumption limit in GiB, when enforced.
    pub disk_limit: Option<f64>,
    /// Memory consumption limit in MiB, when enforced.
    pub memory_limit: Option<f64>,
    /// CPU consumption limit in percent, when enforced.
    pub cpu_limit: Option<f64>,
    /// Elements declared via configuration.
    pub elements: Vec<ElementSpec>,
    /// Default registry endpoint for image pulls.
    pub registry_url: String,
    /// Default registry user.
    pub registry_user: String,
    /// Default registry password.
    pub registry_password: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let instance_id =
            std::env::var("EDGEWARDEN_INSTANCE_ID").unwrap_or_else(|_| "edgewarden".to_string());
        let host_address =
            std::env::var("EDGEWARDEN_HOST_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_string());

        let controller_url = std::env::var("EDGEWARDEN_CONTROLLER_URL").ok();
        let controller_cert = std::env::var("EDGEWARDEN_CONTROLLER_CERT").ok();
        let engine_url = std::env::var("EDGEWARDEN_ENGINE_URL").ok();

        let realtime_port = parse_port("EDGEWARDEN_REALTIME_PORT", 54321)?;
        let query_port = parse_port("EDGEWARDEN_QUERY_PORT", 54322)?;
        let realtime_addr = SocketAddr::from(([0, 0, 0, 0], realtime_port));
        let query_addr = SocketAddr::from(([0, 0, 0, 0], query_port));

        let tick_interval = Duration::from_secs(parse_positive_integer(
            "EDGEWARDEN_TICK_INTERVAL_SECS",
            5,
        )?);
        let retry_limit = parse_positive_integer("EDGEWARDEN_RETRY_LIMIT", 10)? as u32;
        let retention = parse_positive_integer("EDGEWARDEN_RETENTION", 8192)? as usize;

        let disk_limit = parse_positive_float("EDGEWARDEN_DISK_LIMIT")?;
        let memory_limit = parse_positive_float("EDGEWARDEN_MEMORY_LIMIT")?;
        let cpu_limit = parse_positive_float("EDGEWARDEN_CPU_LIMIT")?;

        let elements = std::env::var("EDGEWARDEN_ELEMENTS")
            .map(|spec| parse_elements(&spec))
            .unwrap_or_else(|_| Ok(Vec::new()))?;

        let registry_url =
            std::env::var("EDGEWARDEN_REGISTRY_URL").unwrap_or_else(|_| "docker.io".to_string());
        let registry_user = std::env::var("EDGEWARDEN_REGISTRY_USER").unwrap_or_default();
        let registry_password = std::env::var("EDGEWARDEN_REGISTRY_PASSWORD").unwrap_or_default();

        Ok(Self {
            instance_id,
            host_address,
            controller_url,
            controller_cert,
            engine_url,
            realtime_addr,
            query_addr,
            tick_interval,
            retry_limit,
            retention,
            disk_limit,
            memory_limit,
            cpu_limit,
            elements,
            registry_url,
            registry_user,
            registry_password,
        })
    }

    /// Hostname handed to created containers: instance identity plus the
    /// host address.
    pub fn container_hostname(&self) -> String {
        format!("{}:{}", self.instance_id, self.host_address)
    }
}

fn parse_port(var: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidPort(var)),
        Err(_) => Ok(default),
    }
}

fn parse_positive_integer(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) => match value.parse::<u64>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(ConfigError::NotPositive(var)),
        },
        Err(_) => Ok(default),
    }
}

fn parse_positive_float(var: &'static str) -> Result<Option<f64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => match value.parse::<f64>() {
            Ok(parsed) if parsed > 0.0 && parsed.is_finite() => Ok(Some(parsed)),
            _ => Err(ConfigError::NotPositive(var)),
        },
        Err(_) => Ok(None),
    }
}

/// Parse `id=image,id=image,...` element declarations.
fn parse_elements(spec: &str) -> Result<Vec<ElementSpec>, ConfigError> {
    let mut elements = Vec::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((id, image)) = entry.split_once('=') else {
            return Err(ConfigError::InvalidElementSpec(entry.to_string()));
        };
        let (id, image) = (id.trim(), image.trim());
        if id.is_empty() || image.is_empty() {
            return Err(ConfigError::InvalidElementSpec(entry.to_string()));
        }
        elements.push(ElementSpec {
            id: id.to_string(),
            image: image.to_string(),
        });
    }
    Ok(elements)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A port variable holds an invalid value.
    #[error("Invalid port in {0}")]
    InvalidPort(&'static str),
    /// A numeric variable must be a positive number.
    #[error("{0} must be a positive number")]
    NotPositive(&'static str),
    /// An element declaration does not parse as `id=image`.
    #[error("Invalid element declaration: {0:?} (expected id=image)")]
    InvalidElementSpec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_elements() {
        let elements = parse_elements("cam=acme/camera:2.1, relay=busybox:latest").unwrap();
        assert_eq!(
            elements,
            vec![
                ElementSpec {
                    id: "cam".to_string(),
                    image: "acme/camera:2.1".to_string(),
                },
                ElementSpec {
                    id: "relay".to_string(),
                    image: "busybox:latest".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_elements_empty_and_invalid() {
        assert!(parse_elements("").unwrap().is_empty());
        assert!(parse_elements("no-equals-sign").is_err());
        assert!(parse_elements("=image").is_err());
        assert!(parse_elements("id=").is_err());
    }
}
