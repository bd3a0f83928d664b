//! [`PausedRepository`] for [`InMemoryStore`]

use shipyard_core::repository::RepositoryResult;
use shipyard_core::{PausedRepository, ResourceId};

use crate::InMemoryStore;

#[async_trait::async_trait]
impl PausedRepository for InMemoryStore {
    async fn pause_application(&self, application: &str) -> RepositoryResult<()> {
        self.inner.write().paused_applications.insert(application.to_string());
        Ok(())
    }

    async fn resume_application(&self, application: &str) -> RepositoryResult<()> {
        self.inner.write().paused_applications.remove(application);
        Ok(())
    }

    async fn pause_resource(&self, id: &ResourceId) -> RepositoryResult<()> {
        self.inner.write().paused_resources.insert(id.clone());
        Ok(())
    }

    async fn resume_resource(&self, id: &ResourceId) -> RepositoryResult<()> {
        self.inner.write().paused_resources.remove(id);
        Ok(())
    }

    async fn application_paused(&self, application: &str) -> RepositoryResult<bool> {
        Ok(self.inner.read().paused_applications.contains(application))
    }

    async fn resource_paused(&self, id: &ResourceId) -> RepositoryResult<bool> {
        Ok(self.inner.read().paused_resources.contains(id))
    }
}
