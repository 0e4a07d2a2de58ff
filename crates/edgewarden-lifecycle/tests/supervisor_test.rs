// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation tests for the element supervisor, driven against the
//! mock container engine.

use std::sync::Arc;

use edgewarden_lifecycle::element::{Element, ElementCatalog, Registry};
use edgewarden_lifecycle::runtime::{ContainerRuntime, MockRuntime};
use edgewarden_lifecycle::status::{ElementState, StatusRegistry};
use edgewarden_lifecycle::supervisor::{ElementSupervisor, SupervisorConfig};
use edgewarden_lifecycle::task::{ContainerTask, TaskKind, TaskQueue};

struct Harness {
    catalog: Arc<ElementCatalog>,
    runtime: Arc<MockRuntime>,
    status: Arc<StatusRegistry>,
    tasks: Arc<TaskQueue>,
    supervisor: ElementSupervisor,
}

fn harness_with(runtime: MockRuntime) -> Harness {
    let catalog = Arc::new(ElementCatalog::new());
    catalog.insert(Element::new("el-1", "busybox:latest", "hub"));
    catalog.insert_registry(Registry {
        name: "hub".to_string(),
        url: "registry.example.com".to_string(),
        user: "edge".to_string(),
        password: "secret".to_string(),
    });

    let runtime = Arc::new(runtime);
    let status = Arc::new(StatusRegistry::new());
    let tasks = Arc::new(TaskQueue::new());
    let supervisor = ElementSupervisor::new(
        "el-1",
        catalog.clone(),
        runtime.clone(),
        status.clone(),
        tasks.clone(),
        SupervisorConfig::default(),
    );

    Harness {
        catalog,
        runtime,
        status,
        tasks,
        supervisor,
    }
}

fn harness() -> Harness {
    harness_with(MockRuntime::new())
}

#[tokio::test]
async fn tick_creates_and_starts_missing_container() {
    let mut h = harness();

    h.supervisor.tick().await;

    assert_eq!(h.runtime.call_count("create_container"), 1);
    assert_eq!(h.runtime.call_count("start_container"), 1);
    assert_eq!(h.runtime.container_count(), 1);
    assert_eq!(
        h.status.status_of("el-1").unwrap().state,
        ElementState::Running
    );

    // The created container's identity lands on the catalog entry.
    let element = h.catalog.get("el-1").unwrap();
    assert!(element.container_id.is_some());
    assert!(element.container_ip.is_some());
    assert!(!element.rebuild);
}

#[tokio::test]
async fn existing_container_is_adopted_never_recreated() {
    let h = harness();
    let seeded = h.runtime.seed_container("el-1", "busybox:latest");
    let mut supervisor = h.supervisor;

    supervisor.tick().await;
    supervisor.tick().await;

    // The retrievable container is adopted; create is never issued.
    assert_eq!(h.runtime.call_count("create_container"), 0);
    assert_eq!(h.runtime.container_count(), 1);
    assert_eq!(
        h.status.status_of("el-1").unwrap().state,
        ElementState::Running
    );
    assert!(h.runtime.has_container(&seeded).await.unwrap());
}

#[tokio::test]
async fn removed_element_converges_within_one_tick() {
    let mut h = harness();

    h.supervisor.tick().await;
    assert_eq!(h.runtime.container_count(), 1);

    h.catalog.remove("el-1");
    h.supervisor.tick().await;

    assert_eq!(h.runtime.container_count(), 0);
    assert!(h.supervisor.is_removed());

    // Further ticks never resurrect the container.
    h.supervisor.tick().await;
    assert_eq!(h.runtime.call_count("create_container"), 1);
    assert_eq!(h.runtime.container_count(), 0);
}

#[tokio::test]
async fn update_task_tears_down_and_rebuilds() {
    let mut h = harness();

    h.supervisor.tick().await;
    assert_eq!(h.runtime.call_count("create_container"), 1);

    h.tasks
        .add_task(ContainerTask::new(TaskKind::Update, "el-1", None));
    h.supervisor.tick().await;
    assert_eq!(h.runtime.container_count(), 0);

    h.supervisor.tick().await;
    assert_eq!(h.runtime.call_count("create_container"), 2);
    assert_eq!(h.runtime.container_count(), 1);
    assert_eq!(
        h.status.status_of("el-1").unwrap().state,
        ElementState::Running
    );
}

#[tokio::test]
async fn drifted_container_is_restarted() {
    let mut h = harness();

    h.supervisor.tick().await;
    let container_id = h.catalog.get("el-1").unwrap().container_id.unwrap();

    // Simulate external interference with container state.
    h.runtime
        .set_container_state(&container_id, ElementState::Stopped);
    let starts_before = h.runtime.call_count("start_container");

    h.supervisor.tick().await;

    assert!(h.runtime.call_count("start_container") > starts_before);
    assert_eq!(
        h.status.status_of("el-1").unwrap().state,
        ElementState::Running
    );
    // Self-healing restarts, never rebuilds.
    assert_eq!(h.runtime.call_count("create_container"), 1);
}

#[tokio::test]
async fn start_failure_is_recorded_not_propagated() {
    let mut h = harness_with(MockRuntime::failing_start());

    h.supervisor.tick().await;

    // The container was created; the start failure left it stopped.
    assert_eq!(h.runtime.call_count("create_container"), 1);
    assert_eq!(
        h.status.status_of("el-1").unwrap().state,
        ElementState::Stopped
    );

    // The supervisor stays alive and keeps retrying the start.
    h.supervisor.tick().await;
    assert!(h.runtime.call_count("start_container") >= 2);
}

#[tokio::test]
async fn pull_failure_records_failed_verification() {
    let mut h = harness_with(MockRuntime::failing_pull());

    h.supervisor.tick().await;

    let status = h.status.status_of("el-1").unwrap();
    assert_eq!(status.state, ElementState::FailedVerification);
    assert!(!status.detail.is_empty());
    assert_eq!(h.runtime.container_count(), 0);

    // The next tick retries the create path.
    h.supervisor.tick().await;
    assert_eq!(h.runtime.call_count("pull_image"), 2);
}

#[tokio::test]
async fn inspection_failure_enqueues_rebuild() {
    let h = harness_with(MockRuntime::failing_inspect());
    h.runtime.seed_container("el-1", "busybox:latest");
    let mut supervisor = h.supervisor;

    // The seeded container is adopted, but inspecting it fails: the tick
    // enqueues an Update instead of looping on the same error.
    supervisor.tick().await;

    let pending = h.tasks.pending_for("el-1").unwrap();
    assert_eq!(pending.kind, TaskKind::Update);

    // The queued rebuild tears the container down on the next tick.
    supervisor.tick().await;
    assert_eq!(h.runtime.container_count(), 0);
}

#[tokio::test]
async fn unknown_registry_fails_fast_without_create() {
    let catalog = Arc::new(ElementCatalog::new());
    catalog.insert(Element::new("el-1", "busybox:latest", "nowhere"));
    let runtime = Arc::new(MockRuntime::new());
    let status = Arc::new(StatusRegistry::new());
    let tasks = Arc::new(TaskQueue::new());
    let mut supervisor = ElementSupervisor::new(
        "el-1",
        catalog,
        runtime.clone(),
        status.clone(),
        tasks,
        SupervisorConfig::default(),
    );

    supervisor.tick().await;

    assert_eq!(runtime.call_count("create_container"), 0);
    assert_eq!(runtime.call_count("pull_image"), 0);
    assert!(status.status_of("el-1").is_none());
}

#[tokio::test]
async fn remove_intent_via_task_queue() {
    let mut h = harness();

    h.supervisor.tick().await;
    assert_eq!(h.runtime.container_count(), 1);

    h.tasks
        .add_task(ContainerTask::new(TaskKind::Remove, "el-1", None));
    h.supervisor.tick().await;

    assert_eq!(h.runtime.container_count(), 0);
    // Remove stays pending: the element is never rebuilt.
    h.supervisor.tick().await;
    assert_eq!(h.runtime.call_count("create_container"), 1);
}
