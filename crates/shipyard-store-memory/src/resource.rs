//! [`ResourceRepository`] for [`InMemoryStore`]

use chrono::Duration;
use shipyard_core::repository::RepositoryResult;
use shipyard_core::{DeliveryEvent, RepositoryError, Resource, ResourceId, ResourceRepository};

use crate::{cutoff, due, InMemoryStore, ResourceRow};

#[async_trait::async_trait]
impl ResourceRepository for InMemoryStore {
    async fn get(&self, id: &ResourceId) -> RepositoryResult<Resource> {
        self.inner
            .read()
            .resources
            .get(id)
            .map(|row| row.resource.clone())
            .ok_or_else(|| RepositoryError::not_found("resource", id.as_str()))
    }

    async fn store(&self, resource: Resource) -> RepositoryResult<()> {
        let mut inner = self.inner.write();
        let config_name = inner
            .configs
            .values()
            .find(|row| row.config.application == resource.application)
            .map(|row| row.config.name.clone())
            .unwrap_or_default();
        let last_checked = inner.resources.get(&resource.id).and_then(|row| row.last_checked);
        inner.resources.insert(
            resource.id.clone(),
            ResourceRow {
                resource,
                config_name,
                last_checked,
            },
        );
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> RepositoryResult<()> {
        let mut inner = self.inner.write();
        inner.resources.remove(id);
        inner.history.remove(id);
        inner.fingerprints.remove(id);
        Ok(())
    }

    async fn resources_due_for_check(
        &self,
        min_age: Duration,
        limit: usize,
    ) -> RepositoryResult<Vec<Resource>> {
        let now = self.now();
        let mut inner = self.inner.write();
        let ids = due(
            inner
                .resources
                .iter()
                .map(|(id, row)| (id.clone(), row.last_checked)),
            cutoff(now, min_age),
            limit,
        );
        let mut resources = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = inner.resources.get_mut(&id) {
                row.last_checked = Some(now);
                resources.push(row.resource.clone());
            }
        }
        Ok(resources)
    }

    async fn trigger_resource_recheck(
        &self,
        environment: &str,
        application: &str,
    ) -> RepositoryResult<()> {
        let mut inner = self.inner.write();
        let ids: Vec<ResourceId> = inner
            .configs
            .values()
            .filter(|row| row.config.application == application)
            .filter_map(|row| row.config.environment_named(environment))
            .flat_map(|env| env.resources.iter().map(|r| r.id.clone()))
            .collect();
        for id in ids {
            if let Some(row) = inner.resources.get_mut(&id) {
                row.last_checked = None;
            }
        }
        Ok(())
    }

    async fn append_history(&self, event: &DeliveryEvent) -> RepositoryResult<()> {
        let Some(id) = event.resource_id() else {
            return Ok(());
        };
        let mut inner = self.inner.write();
        let history = inner.history.entry(id.clone()).or_default();
        if event.ignore_repeated_in_history()
            && history.last().is_some_and(|last| last.name() == event.name())
        {
            return Ok(());
        }
        history.push(event.clone());
        Ok(())
    }

    async fn last_event(&self, id: &ResourceId) -> RepositoryResult<Option<DeliveryEvent>> {
        Ok(self
            .inner
            .read()
            .history
            .get(id)
            .and_then(|history| history.last().cloned()))
    }

    async fn event_history(
        &self,
        id: &ResourceId,
        limit: usize,
    ) -> RepositoryResult<Vec<DeliveryEvent>> {
        Ok(self
            .inner
            .read()
            .history
            .get(id)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
