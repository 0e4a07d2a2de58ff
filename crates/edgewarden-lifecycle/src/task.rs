// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle intents and the per-element task queue.
//!
//! The queue holds at most one pending task per element
//! (last-writer-wins within an element, independent across elements) and
//! never runs tasks itself: the owning supervisor drains its entry at the
//! start of each tick. Its only job is removing the race between a
//! caller-issued change and a tick in mid-reconciliation. A task that
//! fails to reconcile is not retried by the queue; the tick re-derives
//! intent from current state.

use std::collections::HashMap;
use std::sync::Mutex;

/// Kind of lifecycle intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Keep the element's container running (steady state).
    Add,
    /// Tear the container down and rebuild it on the next tick.
    Update,
    /// Tear the container down and stop managing the element.
    Remove,
}

/// A pending lifecycle intent for one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTask {
    /// Element the intent applies to.
    pub element_id: String,
    /// What to do.
    pub kind: TaskKind,
    /// Container identifier, when known at issue time.
    pub container_id: Option<String>,
}

impl ContainerTask {
    /// Create a task for an element.
    pub fn new(kind: TaskKind, element_id: impl Into<String>, container_id: Option<String>) -> Self {
        Self {
            element_id: element_id.into(),
            kind,
            container_id,
        }
    }
}

/// Per-element pending-task table.
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<HashMap<String, ContainerTask>>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task, replacing any pending task for the same element.
    pub fn add_task(&self, task: ContainerTask) {
        let mut inner = self.inner.lock().unwrap();
        inner.insert(task.element_id.clone(), task);
    }

    /// Drain the pending task for an element, if any.
    pub fn take(&self, element_id: &str) -> Option<ContainerTask> {
        let mut inner = self.inner.lock().unwrap();
        inner.remove(element_id)
    }

    /// Peek at the pending task for an element without draining it.
    pub fn pending_for(&self, element_id: &str) -> Option<ContainerTask> {
        let inner = self.inner.lock().unwrap();
        inner.get(element_id).cloned()
    }
}
