use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use shipyard_core::settings::{SchedulerSettings, Settings};
use shipyard_core::{
    ArtifactRepository, Constraint, DeliveryConfig, Environment, EnvironmentArtifactPin,
    MutableClock,
};
use shipyard_engine::{Engine, Repositories};
use shipyard_store_memory::InMemoryStore;
use shipyard_test_utils::{
    clock, cluster, cluster_kind, docker_artifact, seeded_store, FakeResourceHandler, HandlerCalls,
    RecordingPublisher, APPLICATION, CONFIG_NAME,
};

struct Harness {
    store: Arc<InMemoryStore>,
    handler: Arc<FakeResourceHandler>,
    publisher: Arc<RecordingPublisher>,
    config: DeliveryConfig,
    engine: Engine,
}

impl Harness {
    async fn new() -> Self {
        let config = DeliveryConfig::new(CONFIG_NAME, APPLICATION)
            .with_artifact(docker_artifact())
            .with_environment(Environment::new("test").with_resource(cluster("test")))
            .with_environment(
                Environment::new("staging")
                    .with_resource(cluster("staging"))
                    .with_constraint(Constraint::DependsOn {
                        environment: "test".into(),
                    }),
            )
            .normalized();
        let clock: Arc<MutableClock> = clock();
        let store = seeded_store(&config, clock.clone()).await;
        let handler = FakeResourceHandler::new(cluster_kind());
        let publisher = RecordingPublisher::new();
        let settings = Settings::default().with_scheduler(
            SchedulerSettings::default()
                .with_resource_batch(0, 10)
                .with_environment_batch(0, 10),
        );
        let engine = Engine::builder(Repositories::from_store(store.clone()), settings)
            .with_clock(clock)
            .with_handler(handler.clone())
            .with_publisher(publisher.clone())
            .build();
        Self {
            store,
            handler,
            publisher,
            config,
            engine,
        }
    }

    async fn is_approved(&self, version: &str, environment: &str) -> bool {
        self.store
            .is_approved_for(&self.config, &docker_artifact(), version, environment)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn approved_versions_flow_through_actuation() {
    let h = Harness::new().await;
    h.store.store_version(&docker_artifact(), "1.0").await.unwrap();
    let desired = json!({ "capacity": 2, "region": "us-east-1", "version": "1.0" });
    h.handler.set_desired(desired.clone());
    h.engine.scheduler.on_application_up();

    assert_eq!(h.engine.scheduler.check_environments().await, 1);
    assert!(h.is_approved("1.0", "test").await);
    assert!(!h.is_approved("1.0", "staging").await);

    assert_eq!(h.engine.scheduler.check_resources().await, 2);
    assert_eq!(h.handler.calls().create, 2);
    assert_eq!(h.publisher.count("ResourceMissing"), 2);
    assert_eq!(h.publisher.count("ResourceActuationLaunched"), 2);

    h.handler.set_current(Some(desired));
    h.engine.scheduler.check_resources().await;
    assert!(h
        .store
        .was_successfully_deployed_to(&h.config, &docker_artifact(), "1.0", "test")
        .await
        .unwrap());

    h.engine.scheduler.check_environments().await;
    assert!(h.is_approved("1.0", "staging").await);
    assert_eq!(h.publisher.count("ArtifactVersionApproved"), 2);
}

#[tokio::test]
async fn closed_gate_touches_nothing() {
    let h = Harness::new().await;
    h.store.store_version(&docker_artifact(), "1.0").await.unwrap();

    assert!(!h.engine.scheduler.is_enabled());
    assert_eq!(h.engine.scheduler.check_environments().await, 0);
    assert_eq!(h.engine.scheduler.check_resources().await, 0);
    assert_eq!(h.engine.scheduler.invoke_agents().await, 0);

    assert_eq!(h.handler.calls(), HandlerCalls::default());
    assert!(h.publisher.events().is_empty());
    assert!(!h.is_approved("1.0", "test").await);
}

#[tokio::test]
async fn pin_overrides_the_newest_version() {
    let h = Harness::new().await;
    for version in ["1.0", "2.0"] {
        h.store.store_version(&docker_artifact(), version).await.unwrap();
    }
    h.engine.scheduler.on_application_up();

    h.engine
        .interventions
        .pin(
            "someone",
            APPLICATION,
            EnvironmentArtifactPin {
                target_environment: "test".into(),
                reference: "fnord".into(),
                version: "1.0".into(),
                pinned_by: None,
                comment: None,
            },
        )
        .await
        .unwrap();
    h.engine.scheduler.check_environments().await;

    assert!(h.is_approved("1.0", "test").await);
    assert!(!h.is_approved("2.0", "test").await);
}

#[tokio::test]
async fn paused_application_is_left_alone() {
    let h = Harness::new().await;
    h.engine.scheduler.on_application_up();

    h.engine
        .pauser
        .pause_application(APPLICATION, "someone")
        .await
        .unwrap();
    h.engine.scheduler.check_resources().await;

    assert_eq!(h.handler.calls().create, 0);
    assert_eq!(h.publisher.count("ResourceCheckSkipped"), 2);
    assert_eq!(h.publisher.count("ResourceActuationPaused"), 2);
}
