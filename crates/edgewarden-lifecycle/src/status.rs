// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Element states and the process-wide status registry.
//!
//! The registry maps element identifier to its last-known lifecycle
//! status. Entries are overwritten, never appended: an element has at
//! most one status at a time. Only the owning supervisor writes an
//! element's entry; any collaborator may read.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an element's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementState {
    /// Image is being pulled and the container created.
    Building,
    /// Engine start requested.
    Starting,
    /// Container observed running.
    Running,
    /// Container observed stopped (or failed to start).
    Stopped,
    /// Create path failed; the element needs a rebuild.
    FailedVerification,
}

impl std::fmt::Display for ElementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementState::Building => "BUILDING",
            ElementState::Starting => "STARTING",
            ElementState::Running => "RUNNING",
            ElementState::Stopped => "STOPPED",
            ElementState::FailedVerification => "FAILED_VERIFICATION",
        };
        f.write_str(name)
    }
}

/// Last-known status of one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementStatus {
    /// Lifecycle state.
    pub state: ElementState,
    /// Free-form detail (engine status string, error message).
    pub detail: String,
}

impl ElementStatus {
    /// Status with an empty detail string.
    pub fn new(state: ElementState) -> Self {
        Self {
            state,
            detail: String::new(),
        }
    }

    /// Status with a detail string.
    pub fn with_detail(state: ElementState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
        }
    }
}

/// Process-wide table of element statuses.
///
/// Writes are partitioned by element identifier: concurrent supervisors
/// never corrupt each other's entries.
#[derive(Default)]
pub struct StatusRegistry {
    inner: Mutex<HashMap<String, ElementStatus>>,
}

impl StatusRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status of an element, overwriting any prior entry.
    pub fn set_element_status(&self, element_id: &str, status: ElementStatus) {
        let mut inner = self.inner.lock().unwrap();
        inner.insert(element_id.to_string(), status);
    }

    /// Last-known status of an element.
    pub fn status_of(&self, element_id: &str) -> Option<ElementStatus> {
        let inner = self.inner.lock().unwrap();
        inner.get(element_id).cloned()
    }

    /// Snapshot of all element statuses, for reporting.
    pub fn snapshot(&self) -> HashMap<String, ElementStatus> {
        self.inner.lock().unwrap().clone()
    }
}
