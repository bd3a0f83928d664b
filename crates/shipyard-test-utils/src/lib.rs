//! Testing utilities for the Shipyard workspace
//!
//! Shared fixtures, a recording event publisher and a scripted resource handler.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shipyard_core::{
    ActionDecision, ArtifactType, DeliveryArtifact, DeliveryConfig, DeliveryConfigRepository,
    DeliveryEvent, Environment, EventPublisher, MutableClock, PluginError, Resource,
    ResourceDiff, ResourceHandler, ResourceKind, Task,
};
use shipyard_store_memory::InMemoryStore;

pub const APPLICATION: &str = "fnord";
pub const CONFIG_NAME: &str = "fnord-manifest";
pub const ARTIFACT_REFERENCE: &str = "fnord";

/// Monday 2026-03-02 10:00 UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub fn clock() -> Arc<MutableClock> {
    Arc::new(MutableClock::new(start_time()))
}

pub fn cluster_kind() -> ResourceKind {
    ResourceKind::new("ec2", "cluster", "v1")
}

pub fn docker_artifact() -> DeliveryArtifact {
    DeliveryArtifact::new("fnord/app", ArtifactType::Docker, ARTIFACT_REFERENCE)
        .with_delivery_config(CONFIG_NAME)
}

pub fn debian_artifact() -> DeliveryArtifact {
    DeliveryArtifact::new("fnord", ArtifactType::Debian, "fnord-deb")
        .with_delivery_config(CONFIG_NAME)
}

/// Cluster in `environment` deploying the docker artifact
pub fn cluster(environment: &str) -> Resource {
    Resource::new(
        format!("ec2:cluster:{environment}:fnord"),
        cluster_kind(),
        APPLICATION,
        json!({ "capacity": 2, "region": "us-east-1" }),
    )
    .with_artifact(ARTIFACT_REFERENCE)
}

/// `test` and `staging` environments, one cluster each, no constraints
pub fn delivery_config() -> DeliveryConfig {
    DeliveryConfig::new(CONFIG_NAME, APPLICATION)
        .with_service_account("deploybot@example.com")
        .with_artifact(docker_artifact())
        .with_environment(Environment::new("test").with_resource(cluster("test")))
        .with_environment(Environment::new("staging").with_resource(cluster("staging")))
        .normalized()
}

/// Store on `clock` holding `config`
pub async fn seeded_store(config: &DeliveryConfig, clock: Arc<MutableClock>) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::with_clock(clock));
    DeliveryConfigRepository::store(store.as_ref(), config.clone())
        .await
        .unwrap();
    store
}

/// Publisher that keeps every event
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DeliveryEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(DeliveryEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DeliveryEvent) {
        self.events.lock().push(event);
    }
}

/// Calls received by a [`FakeResourceHandler`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerCalls {
    pub desired: usize,
    pub current: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub will_take_action: usize,
}

/// Resource handler with scripted state
///
/// Desired state defaults to the resource spec. Current state starts
/// missing. `artifact_version` reads the `version` field of desired state.
pub struct FakeResourceHandler {
    kind: ResourceKind,
    desired: Mutex<Option<Value>>,
    current: Mutex<Option<Value>>,
    resolve_error: Mutex<Option<PluginError>>,
    update_error: Mutex<Option<PluginError>>,
    in_progress: Mutex<bool>,
    decision: Mutex<ActionDecision>,
    update_launches: Mutex<bool>,
    calls: Mutex<HandlerCalls>,
}

impl FakeResourceHandler {
    pub fn new(kind: ResourceKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            desired: Mutex::new(None),
            current: Mutex::new(None),
            resolve_error: Mutex::new(None),
            update_error: Mutex::new(None),
            in_progress: Mutex::new(false),
            decision: Mutex::new(ActionDecision::proceed()),
            update_launches: Mutex::new(true),
            calls: Mutex::new(HandlerCalls::default()),
        })
    }

    pub fn set_desired(&self, desired: Value) {
        *self.desired.lock() = Some(desired);
    }

    pub fn set_current(&self, current: Option<Value>) {
        *self.current.lock() = current;
    }

    pub fn fail_resolution(&self, error: Option<PluginError>) {
        *self.resolve_error.lock() = error;
    }

    pub fn fail_updates(&self, error: Option<PluginError>) {
        *self.update_error.lock() = error;
    }

    pub fn set_in_progress(&self, in_progress: bool) {
        *self.in_progress.lock() = in_progress;
    }

    pub fn set_decision(&self, decision: ActionDecision) {
        *self.decision.lock() = decision;
    }

    pub fn set_update_launches(&self, launches: bool) {
        *self.update_launches.lock() = launches;
    }

    pub fn calls(&self) -> HandlerCalls {
        *self.calls.lock()
    }

    fn task(&self, verb: &str, resource: &Resource) -> Task {
        Task::new(ulid::Ulid::new().to_string(), format!("{verb} {}", resource.id))
    }
}

#[async_trait::async_trait]
impl ResourceHandler for FakeResourceHandler {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supported_kind(&self) -> ResourceKind {
        self.kind.clone()
    }

    async fn desired(&self, resource: &Resource) -> Result<Value, PluginError> {
        self.calls.lock().desired += 1;
        if let Some(error) = self.resolve_error.lock().clone() {
            return Err(error);
        }
        Ok(self
            .desired
            .lock()
            .clone()
            .unwrap_or_else(|| resource.spec.clone()))
    }

    async fn current(&self, _resource: &Resource) -> Result<Option<Value>, PluginError> {
        self.calls.lock().current += 1;
        Ok(self.current.lock().clone())
    }

    async fn create(&self, resource: &Resource, _diff: &ResourceDiff) -> Result<Vec<Task>, PluginError> {
        self.calls.lock().create += 1;
        Ok(vec![self.task("create", resource)])
    }

    async fn update(&self, resource: &Resource, _diff: &ResourceDiff) -> Result<Vec<Task>, PluginError> {
        self.calls.lock().update += 1;
        if let Some(error) = self.update_error.lock().clone() {
            return Err(error);
        }
        if *self.update_launches.lock() {
            Ok(vec![self.task("update", resource)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn delete(&self, resource: &Resource) -> Result<Vec<Task>, PluginError> {
        self.calls.lock().delete += 1;
        Ok(vec![self.task("delete", resource)])
    }

    async fn actuation_in_progress(&self, _resource: &Resource) -> Result<bool, PluginError> {
        Ok(*self.in_progress.lock())
    }

    async fn will_take_action(
        &self,
        _resource: &Resource,
        _diff: &ResourceDiff,
    ) -> Result<ActionDecision, PluginError> {
        self.calls.lock().will_take_action += 1;
        Ok(self.decision.lock().clone())
    }

    fn artifact_version(&self, desired: &Value) -> Option<String> {
        desired.get("version").and_then(Value::as_str).map(str::to_string)
    }
}
