//! [`DeliveryConfigRepository`] for [`InMemoryStore`]

use chrono::{DateTime, Duration, Utc};
use shipyard_core::repository::RepositoryResult;
use shipyard_core::{
    ConstraintState, ConstraintStatus, DeliveryConfig, DeliveryConfigRepository, RepositoryError,
    ResourceId,
};

use crate::{cutoff, due, ConfigRow, InMemoryStore, ResourceRow};

#[async_trait::async_trait]
impl DeliveryConfigRepository for InMemoryStore {
    async fn get(&self, name: &str) -> RepositoryResult<DeliveryConfig> {
        self.inner
            .read()
            .configs
            .get(name)
            .map(|row| row.config.clone())
            .ok_or_else(|| RepositoryError::not_found("delivery config", name))
    }

    async fn all(&self) -> RepositoryResult<Vec<DeliveryConfig>> {
        let inner = self.inner.read();
        let mut configs: Vec<DeliveryConfig> =
            inner.configs.values().map(|row| row.config.clone()).collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn store(&self, config: DeliveryConfig) -> RepositoryResult<()> {
        let config = config.normalized();
        let mut inner = self.inner.write();

        if let Some(other) = inner
            .configs
            .values()
            .find(|row| row.config.application == config.application && row.config.name != config.name)
        {
            return Err(RepositoryError::Conflict(format!(
                "application {} already has delivery config {}",
                config.application, other.config.name
            )));
        }

        let declared: Vec<ResourceId> = config.resources().map(|r| r.id.clone()).collect();
        let removed: Vec<ResourceId> = inner
            .resources
            .iter()
            .filter(|(id, row)| row.config_name == config.name && !declared.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in removed {
            tracing::debug!("removing resource {} dropped from {}", id, config.name);
            inner.resources.remove(&id);
            inner.history.remove(&id);
            inner.fingerprints.remove(&id);
        }

        for resource in config.resources() {
            let last_checked = inner
                .resources
                .get(&resource.id)
                .and_then(|row| row.last_checked);
            inner.resources.insert(
                resource.id.clone(),
                ResourceRow {
                    resource: resource.clone(),
                    config_name: config.name.clone(),
                    last_checked,
                },
            );
        }

        let last_checked = inner.configs.get(&config.name).and_then(|row| row.last_checked);
        inner.configs.insert(
            config.name.clone(),
            ConfigRow {
                config,
                last_checked,
            },
        );
        Ok(())
    }

    async fn delivery_config_for_resource(
        &self,
        id: &ResourceId,
    ) -> RepositoryResult<DeliveryConfig> {
        let inner = self.inner.read();
        inner
            .resources
            .get(id)
            .and_then(|row| inner.configs.get(&row.config_name))
            .map(|row| row.config.clone())
            .ok_or_else(|| RepositoryError::not_found("delivery config for resource", id.as_str()))
    }

    async fn delivery_config_for_application(
        &self,
        application: &str,
    ) -> RepositoryResult<DeliveryConfig> {
        self.inner
            .read()
            .configs
            .values()
            .find(|row| row.config.application == application)
            .map(|row| row.config.clone())
            .ok_or_else(|| RepositoryError::not_found("delivery config for application", application))
    }

    async fn delivery_configs_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> RepositoryResult<Vec<DeliveryConfig>> {
        let now = self.now();
        let mut inner = self.inner.write();
        let names = due(
            inner
                .configs
                .iter()
                .map(|(name, row)| (name.clone(), row.last_checked)),
            cutoff(now, min_age),
            limit,
        );
        let mut configs = Vec::with_capacity(names.len());
        for name in names {
            if let Some(row) = inner.configs.get_mut(&name) {
                row.last_checked = Some(now);
                configs.push(row.config.clone());
            }
        }
        Ok(configs)
    }

    async fn delivery_config_last_checked(
        &self,
        name: &str,
    ) -> RepositoryResult<Option<DateTime<Utc>>> {
        self.inner
            .read()
            .configs
            .get(name)
            .map(|row| row.last_checked)
            .ok_or_else(|| RepositoryError::not_found("delivery config", name))
    }

    async fn trigger_recheck(&self, application: &str) -> RepositoryResult<()> {
        let mut inner = self.inner.write();
        for row in inner.configs.values_mut() {
            if row.config.application == application {
                row.last_checked = None;
            }
        }
        Ok(())
    }

    async fn delete_environment(&self, config_name: &str, environment: &str) -> RepositoryResult<()> {
        let mut inner = self.inner.write();
        let row = inner
            .configs
            .get_mut(config_name)
            .ok_or_else(|| RepositoryError::not_found("delivery config", config_name))?;

        let Some(index) = row.config.environments.iter().position(|e| e.name == environment) else {
            return Ok(());
        };
        let removed = row.config.environments.remove(index);

        for resource in &removed.resources {
            inner.resources.remove(&resource.id);
            inner.history.remove(&resource.id);
            inner.fingerprints.remove(&resource.id);
        }
        inner
            .constraint_states
            .retain(|(config, env, ..), _| !(config == config_name && env == environment));
        inner
            .queued
            .retain(|(config, env, ..)| !(config == config_name && env == environment));
        inner
            .environments
            .retain(|(config, env, ..), _| !(config == config_name && env == environment));
        tracing::info!("deleted environment {} from {}", environment, config_name);
        Ok(())
    }

    async fn get_constraint_state(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
        version: &str,
        constraint_type: &str,
    ) -> RepositoryResult<Option<ConstraintState>> {
        let key = (
            config_name.to_string(),
            environment.to_string(),
            artifact_reference.to_string(),
            version.to_string(),
            constraint_type.to_string(),
        );
        Ok(self.inner.read().constraint_states.get(&key).cloned())
    }

    async fn constraint_state_for(
        &self,
        config_name: &str,
        environment: &str,
    ) -> RepositoryResult<Vec<ConstraintState>> {
        let inner = self.inner.read();
        let mut states: Vec<ConstraintState> = inner
            .constraint_states
            .values()
            .filter(|s| s.delivery_config_name == config_name && s.environment_name == environment)
            .cloned()
            .collect();
        states.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(states)
    }

    async fn store_constraint_state(&self, state: ConstraintState) -> RepositoryResult<()> {
        let key = (
            state.delivery_config_name.clone(),
            state.environment_name.clone(),
            state.artifact_reference.clone(),
            state.artifact_version.clone(),
            state.constraint_type.clone(),
        );
        self.inner.write().constraint_states.insert(key, state);
        Ok(())
    }

    async fn pending_constraint_versions_for(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
    ) -> RepositoryResult<Vec<String>> {
        let inner = self.inner.read();
        let mut versions: Vec<String> = inner
            .constraint_states
            .values()
            .filter(|s| {
                s.delivery_config_name == config_name
                    && s.environment_name == environment
                    && s.artifact_reference == artifact_reference
                    && s.status == ConstraintStatus::Pending
            })
            .map(|s| s.artifact_version.clone())
            .collect();
        versions.sort();
        versions.dedup();
        Ok(versions)
    }

    async fn queue_all_constraints_approved(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
        version: &str,
    ) -> RepositoryResult<()> {
        self.inner.write().queued.insert((
            config_name.to_string(),
            environment.to_string(),
            artifact_reference.to_string(),
            version.to_string(),
        ));
        Ok(())
    }

    async fn get_queued_constraint_approvals(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
    ) -> RepositoryResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .queued
            .iter()
            .filter(|(config, env, reference, _)| {
                config == config_name && env == environment && reference == artifact_reference
            })
            .map(|(.., version)| version.clone())
            .collect())
    }

    async fn delete_queued_constraint_approval(
        &self,
        config_name: &str,
        environment: &str,
        artifact_reference: &str,
        version: &str,
    ) -> RepositoryResult<()> {
        self.inner.write().queued.remove(&(
            config_name.to_string(),
            environment.to_string(),
            artifact_reference.to_string(),
            version.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use shipyard_core::{
        ArtifactType, Clock, DeliveryArtifact, Environment, MutableClock, Resource, ResourceKind,
        ResourceRepository,
    };

    use super::*;

    fn config() -> DeliveryConfig {
        DeliveryConfig::new("fnord-manifest", "fnord")
            .with_artifact(DeliveryArtifact::new("fnord", ArtifactType::Docker, "fnord-image"))
            .with_environment(Environment::new("test").with_resource(
                Resource::new(
                    "ec2:cluster:test:fnord",
                    ResourceKind::new("ec2", "cluster", "1"),
                    "fnord",
                    serde_json::json!({}),
                )
                .with_artifact("fnord-image"),
            ))
    }

    fn store() -> (Arc<MutableClock>, InMemoryStore) {
        let clock = Arc::new(MutableClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
        ));
        let store = InMemoryStore::with_clock(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn configs_are_due_until_checked_within_min_age() {
        let (clock, store) = store();
        DeliveryConfigRepository::store(&store, config()).await.unwrap();

        assert_eq!(store.delivery_config_last_checked("fnord-manifest").await.unwrap(), None);

        let due = store
            .delivery_configs_due_for_check(Duration::seconds(30), 10)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert!(store
            .delivery_configs_due_for_check(Duration::seconds(30), 10)
            .await
            .unwrap()
            .is_empty());

        clock.tick(Duration::seconds(31));
        assert_eq!(
            store
                .delivery_configs_due_for_check(Duration::seconds(30), 10)
                .await
                .unwrap()
                .len(),
            1
        );

        store.trigger_recheck("fnord").await.unwrap();
        assert_eq!(store.delivery_config_last_checked("fnord-manifest").await.unwrap(), None);
    }

    #[tokio::test]
    async fn storing_a_config_upserts_its_resources() {
        let (_, store) = store();
        DeliveryConfigRepository::store(&store, config()).await.unwrap();

        let id = ResourceId::new("ec2:cluster:test:fnord");
        let resource = ResourceRepository::get(&store, &id).await.unwrap();
        assert_eq!(resource.application, "fnord");
        assert_eq!(
            store.delivery_config_for_resource(&id).await.unwrap().name,
            "fnord-manifest"
        );

        let mut without_resources = config();
        without_resources.environments[0].resources.clear();
        DeliveryConfigRepository::store(&store, without_resources).await.unwrap();
        assert!(ResourceRepository::get(&store, &id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn deleting_an_environment_drops_its_state() {
        let (clock, store) = store();
        DeliveryConfigRepository::store(&store, config()).await.unwrap();
        store
            .queue_all_constraints_approved("fnord-manifest", "test", "fnord-image", "1.0")
            .await
            .unwrap();
        store
            .store_constraint_state(ConstraintState::pending(
                "fnord-manifest",
                "test",
                "fnord-image",
                "1.0",
                "manual-judgement",
                clock.now(),
            ))
            .await
            .unwrap();

        store.delete_environment("fnord-manifest", "test").await.unwrap();

        let config = DeliveryConfigRepository::get(&store, "fnord-manifest").await.unwrap();
        assert!(config.environment_named("test").is_none());
        assert!(store
            .get_queued_constraint_approvals("fnord-manifest", "test", "fnord-image")
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .pending_constraint_versions_for("fnord-manifest", "test", "fnord-image")
            .await
            .unwrap()
            .is_empty());

        // deleting again is a no-op
        store.delete_environment("fnord-manifest", "test").await.unwrap();
    }

    #[tokio::test]
    async fn one_config_per_application() {
        let (_, store) = store();
        DeliveryConfigRepository::store(&store, config()).await.unwrap();
        let err = DeliveryConfigRepository::store(&store, DeliveryConfig::new("other", "fnord"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }
}
