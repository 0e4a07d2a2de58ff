// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The element catalog: declared workloads and their image registries.
//!
//! The catalog owns the declared state. Supervisors borrow an element's
//! identity to manage its container and write back the observed container
//! id and address, but the catalog entry itself is owned here.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A declared workload to keep running as one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Unique element identifier.
    pub id: String,
    /// Image reference to run.
    pub image: String,
    /// Name of the registry the image is pulled from.
    pub registry: String,
    /// Identifier of the element's container, once created.
    #[serde(default)]
    pub container_id: Option<String>,
    /// IP address of the element's container, once created.
    #[serde(default)]
    pub container_ip: Option<String>,
    /// Whether the container must be rebuilt on the next reconciliation.
    #[serde(default)]
    pub rebuild: bool,
}

impl Element {
    /// Declare a new element.
    pub fn new(id: impl Into<String>, image: impl Into<String>, registry: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            registry: registry.into(),
            container_id: None,
            container_ip: None,
            rebuild: false,
        }
    }
}

/// An image registry and its credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Registry name, referenced by elements.
    pub name: String,
    /// Registry endpoint URL.
    pub url: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
}

/// Shared catalog of declared elements and named registries.
#[derive(Default)]
pub struct ElementCatalog {
    elements: Mutex<HashMap<String, Element>>,
    registries: Mutex<HashMap<String, Registry>>,
}

impl ElementCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare or replace an element.
    pub fn insert(&self, element: Element) {
        let mut elements = self.elements.lock().unwrap();
        elements.insert(element.id.clone(), element);
    }

    /// Remove an element from the catalog.
    pub fn remove(&self, element_id: &str) -> Option<Element> {
        let mut elements = self.elements.lock().unwrap();
        elements.remove(element_id)
    }

    /// Copy of the element, if declared.
    pub fn get(&self, element_id: &str) -> Option<Element> {
        let elements = self.elements.lock().unwrap();
        elements.get(element_id).cloned()
    }

    /// Identifiers of all declared elements.
    pub fn element_ids(&self) -> Vec<String> {
        let elements = self.elements.lock().unwrap();
        elements.keys().cloned().collect()
    }

    /// Register or replace a named registry.
    pub fn insert_registry(&self, registry: Registry) {
        let mut registries = self.registries.lock().unwrap();
        registries.insert(registry.name.clone(), registry);
    }

    /// Copy of the named registry, if known.
    pub fn registry(&self, name: &str) -> Option<Registry> {
        let registries = self.registries.lock().unwrap();
        registries.get(name).cloned()
    }

    /// Record the created container's identity on the element.
    pub fn record_container(&self, element_id: &str, container_id: &str, container_ip: Option<String>) {
        let mut elements = self.elements.lock().unwrap();
        if let Some(element) = elements.get_mut(element_id) {
            element.container_id = Some(container_id.to_string());
            element.container_ip = container_ip;
            element.rebuild = false;
        }
    }

    /// Clear the element's container identity after teardown.
    pub fn clear_container(&self, element_id: &str) {
        let mut elements = self.elements.lock().unwrap();
        if let Some(element) = elements.get_mut(element_id) {
            element.container_id = None;
            element.container_ip = None;
        }
    }

    /// Mark an element for rebuild on the next reconciliation.
    pub fn mark_rebuild(&self, element_id: &str) {
        let mut elements = self.elements.lock().unwrap();
        if let Some(element) = elements.get_mut(element_id) {
            element.rebuild = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let catalog = ElementCatalog::new();
        catalog.insert(Element::new("el-1", "busybox:latest", "hub"));

        assert!(catalog.get("el-1").is_some());
        assert_eq!(catalog.element_ids(), vec!["el-1".to_string()]);

        catalog.remove("el-1");
        assert!(catalog.get("el-1").is_none());
    }

    #[test]
    fn test_record_container_clears_rebuild() {
        let catalog = ElementCatalog::new();
        let mut element = Element::new("el-1", "busybox:latest", "hub");
        element.rebuild = true;
        catalog.insert(element);

        catalog.record_container("el-1", "c-123", Some("172.17.0.2".to_string()));

        let element = catalog.get("el-1").unwrap();
        assert_eq!(element.container_id.as_deref(), Some("c-123"));
        assert_eq!(element.container_ip.as_deref(), Some("172.17.0.2"));
        assert!(!element.rebuild);
    }

    #[test]
    fn test_clear_container() {
        let catalog = ElementCatalog::new();
        catalog.insert(Element::new("el-1", "busybox:latest", "hub"));
        catalog.record_container("el-1", "c-123", None);

        catalog.clear_container("el-1");

        let element = catalog.get("el-1").unwrap();
        assert!(element.container_id.is_none());
        assert!(element.container_ip.is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let catalog = ElementCatalog::new();
        catalog.insert_registry(Registry {
            name: "hub".to_string(),
            url: "registry.example.com".to_string(),
            user: "edge".to_string(),
            password: "secret".to_string(),
        });

        assert!(catalog.registry("hub").is_some());
        assert!(catalog.registry("unknown").is_none());
    }
}
