//! Cancellation of tasks made obsolete by a pin or veto

use std::collections::HashSet;
use std::sync::Arc;

use shipyard_core::{
    DeliveryConfigRepository, EnvironmentArtifactPin, EnvironmentArtifactVeto, ResourceId,
    TaskLauncher, TaskStatus, TaskTrackingRepository,
};
use tracing::info;

use crate::error::InterventionError;

/// Cancels in-flight tasks deploying a superseded version
pub struct EnvironmentTaskCanceler {
    delivery_configs: Arc<dyn DeliveryConfigRepository>,
    tasks: Arc<dyn TaskTrackingRepository>,
    launcher: Arc<dyn TaskLauncher>,
}

impl EnvironmentTaskCanceler {
    pub fn new(
        delivery_configs: Arc<dyn DeliveryConfigRepository>,
        tasks: Arc<dyn TaskTrackingRepository>,
        launcher: Arc<dyn TaskLauncher>,
    ) -> Self {
        Self {
            delivery_configs,
            tasks,
            launcher,
        }
    }

    /// Cancel tasks deploying anything other than the pinned version
    ///
    /// Returns the cancelled task ids.
    pub async fn cancel_tasks_for_pin(
        &self,
        application: &str,
        pin: &EnvironmentArtifactPin,
        user: &str,
    ) -> Result<Vec<String>, InterventionError> {
        self.cancel_matching(application, &pin.target_environment, &pin.reference, user, |version| {
            version != pin.version
        })
        .await
    }

    /// Cancel tasks deploying the vetoed version
    ///
    /// Returns the cancelled task ids.
    pub async fn cancel_tasks_for_veto(
        &self,
        application: &str,
        veto: &EnvironmentArtifactVeto,
        user: &str,
    ) -> Result<Vec<String>, InterventionError> {
        self.cancel_matching(application, &veto.target_environment, &veto.reference, user, |version| {
            version == veto.version
        })
        .await
    }

    async fn cancel_matching(
        &self,
        application: &str,
        environment: &str,
        reference: &str,
        user: &str,
        obsolete: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>, InterventionError> {
        let config = self
            .delivery_configs
            .delivery_config_for_application(application)
            .await?;
        let relevant: HashSet<ResourceId> = config
            .environment_named(environment)
            .map(|env| env.resource_ids_using(reference).into_iter().collect())
            .unwrap_or_default();
        if relevant.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = self
            .tasks
            .get_in_flight_tasks(application, environment)
            .await?
            .into_iter()
            .filter(|task| relevant.contains(&task.resource_id))
            .filter(|task| task.artifact_version.as_deref().is_some_and(&obsolete))
            .map(|task| task.id)
            .collect();
        if ids.is_empty() {
            return Ok(ids);
        }

        info!(
            "cancelling {} obsolete task(s) of {} in {} on behalf of {}",
            ids.len(),
            application,
            environment,
            user
        );
        self.launcher
            .cancel_tasks(&ids, user)
            .await
            .map_err(InterventionError::TaskCancellation)?;
        for id in &ids {
            self.tasks.update_status(id, TaskStatus::Cancelled).await?;
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shipyard_core::plugins::MockTaskLauncher;
    use shipyard_core::{Resource, TaskRecord};
    use shipyard_store_memory::InMemoryStore;
    use shipyard_test_utils::{clock, cluster, delivery_config, seeded_store, start_time, APPLICATION};

    fn record(id: &str, resource: &Resource, environment: &str, version: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            name: format!("deploy {version}"),
            resource_id: resource.id.clone(),
            application: APPLICATION.into(),
            environment_name: environment.into(),
            artifact_version: Some(version.into()),
            started_at: start_time(),
            status: TaskStatus::Running,
        }
    }

    async fn store_with_tasks() -> Arc<InMemoryStore> {
        let store = seeded_store(&delivery_config(), clock()).await;
        for task in [
            record("t1", &cluster("test"), "test", "1.0"),
            record("t2", &cluster("test"), "test", "2.0"),
            record("t3", &cluster("staging"), "staging", "2.0"),
        ] {
            TaskTrackingRepository::store(store.as_ref(), task).await.unwrap();
        }
        store
    }

    fn launcher(expected: &'static [&'static str]) -> Arc<dyn TaskLauncher> {
        let mut launcher = MockTaskLauncher::new();
        launcher
            .expect_cancel_tasks()
            .withf(move |ids, user| ids == expected && user == "someone")
            .times(usize::from(!expected.is_empty()))
            .returning(|_, _| Ok(()));
        Arc::new(launcher)
    }

    #[tokio::test]
    async fn pin_cancels_other_versions() {
        let store = store_with_tasks().await;
        let canceler = EnvironmentTaskCanceler::new(store.clone(), store.clone(), launcher(&["t2"]));
        let pin = EnvironmentArtifactPin {
            target_environment: "test".into(),
            reference: "fnord".into(),
            version: "1.0".into(),
            pinned_by: Some("someone".into()),
            comment: None,
        };

        let cancelled = canceler.cancel_tasks_for_pin(APPLICATION, &pin, "someone").await.unwrap();

        assert_eq!(cancelled, ["t2"]);
        let mut running: Vec<String> = store
            .all_in_flight()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        running.sort();
        assert_eq!(running, ["t1", "t3"]);
    }

    #[tokio::test]
    async fn veto_cancels_the_vetoed_version() {
        let store = store_with_tasks().await;
        let canceler = EnvironmentTaskCanceler::new(store.clone(), store.clone(), launcher(&["t3"]));
        let veto = EnvironmentArtifactVeto {
            target_environment: "staging".into(),
            reference: "fnord".into(),
            version: "2.0".into(),
            vetoed_by: "someone".into(),
            comment: None,
        };

        let cancelled = canceler.cancel_tasks_for_veto(APPLICATION, &veto, "someone").await.unwrap();

        assert_eq!(cancelled, ["t3"]);
    }

    #[tokio::test]
    async fn no_relevant_resources_cancels_nothing() {
        let store = store_with_tasks().await;
        let canceler = EnvironmentTaskCanceler::new(store.clone(), store, launcher(&[]));
        let veto = EnvironmentArtifactVeto {
            target_environment: "test".into(),
            reference: "fnord-deb".into(),
            version: "2.0".into(),
            vetoed_by: "someone".into(),
            comment: None,
        };

        let cancelled = canceler.cancel_tasks_for_veto(APPLICATION, &veto, "someone").await.unwrap();

        assert!(cancelled.is_empty());
    }
}
