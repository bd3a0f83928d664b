//! [`TaskTrackingRepository`] for [`InMemoryStore`]

use shipyard_core::repository::RepositoryResult;
use shipyard_core::{RepositoryError, TaskRecord, TaskStatus, TaskTrackingRepository};

use crate::InMemoryStore;

#[async_trait::async_trait]
impl TaskTrackingRepository for InMemoryStore {
    async fn store(&self, record: TaskRecord) -> RepositoryResult<()> {
        self.inner.write().tasks.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_in_flight_tasks(
        &self,
        application: &str,
        environment: &str,
    ) -> RepositoryResult<Vec<TaskRecord>> {
        let mut tasks: Vec<TaskRecord> = self
            .inner
            .read()
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Running
                    && t.application == application
                    && t.environment_name == environment
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(tasks)
    }

    async fn all_in_flight(&self) -> RepositoryResult<Vec<TaskRecord>> {
        let mut tasks: Vec<TaskRecord> = self
            .inner
            .read()
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(tasks)
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> RepositoryResult<()> {
        let mut inner = self.inner.write();
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| RepositoryError::not_found("task", task_id))?;
        task.status = status;
        Ok(())
    }
}
