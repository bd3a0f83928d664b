use std::sync::Arc;

use futures::future::join_all;
use shipyard_core::{
    AgentError, Clock, DeliveryEvent, EventPublisher, ScheduledAgent, TaskLauncher, TaskRecord,
    TaskStatus,
};
use tracing::{debug, info, warn};

use crate::repositories::Repositories;

/// Polls in-flight tasks and records how they finished
///
/// A finished task becomes a `ResourceTaskSucceeded` or `ResourceTaskFailed`
/// entry in its resource's history, which the next resource check reads to
/// report the delta as resolved.
pub struct TaskMonitorAgent {
    repositories: Repositories,
    launcher: Arc<dyn TaskLauncher>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl TaskMonitorAgent {
    pub const LOCK_NAME: &'static str = "TaskMonitorAgent";

    pub fn new(
        repositories: Repositories,
        launcher: Arc<dyn TaskLauncher>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            launcher,
            publisher,
            clock,
        }
    }

    async fn finish(&self, task: &TaskRecord, status: TaskStatus) -> Result<(), AgentError> {
        self.repositories.tasks.update_status(&task.id, status).await?;
        let resource = match self.repositories.resources.get(&task.resource_id).await {
            Ok(resource) => resource,
            Err(e) if e.is_not_found() => {
                debug!("task {} finished for removed resource {}", task.id, task.resource_id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let at = self.clock.now();
        let event = match status {
            TaskStatus::Succeeded => DeliveryEvent::ResourceTaskSucceeded {
                resource: (&resource).into(),
                task_id: task.id.clone(),
                at,
            },
            TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Running => {
                DeliveryEvent::ResourceTaskFailed {
                    resource: (&resource).into(),
                    task_id: task.id.clone(),
                    message: Some(format!("{} ended as {:?}", task.name, status)),
                    at,
                }
            }
        };
        info!("task {} of {} finished: {:?}", task.id, task.resource_id, status);
        self.repositories.resources.append_history(&event).await?;
        self.publisher.publish(event);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ScheduledAgent for TaskMonitorAgent {
    fn lock_name(&self) -> &'static str {
        Self::LOCK_NAME
    }

    fn lock_timeout_seconds(&self) -> u64 {
        300
    }

    async fn invoke_agent(&self) -> Result<(), AgentError> {
        let tasks = self.repositories.tasks.all_in_flight().await?;
        let statuses = join_all(tasks.iter().map(|task| self.launcher.task_status(&task.id))).await;
        for (task, status) in tasks.iter().zip(statuses) {
            match status {
                Ok(TaskStatus::Running) => {}
                Ok(status) => self.finish(task, status).await?,
                Err(e) => warn!("unable to get status of task {}: {}", task.id, e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::plugins::MockTaskLauncher;
    use shipyard_core::{PluginError, ResourceRepository, TaskTrackingRepository};
    use shipyard_test_utils::{clock, cluster, delivery_config, seeded_store, start_time, RecordingPublisher, APPLICATION};

    fn running(id: &str, environment: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            name: format!("deploy {environment}"),
            resource_id: cluster(environment).id,
            application: APPLICATION.into(),
            environment_name: environment.into(),
            artifact_version: Some("1.0".into()),
            started_at: start_time(),
            status: TaskStatus::Running,
        }
    }

    #[tokio::test]
    async fn finished_tasks_are_recorded_in_history() {
        let clock = clock();
        let store = seeded_store(&delivery_config(), clock.clone()).await;
        for task in [running("t1", "test"), running("t2", "staging"), running("t3", "staging")] {
            TaskTrackingRepository::store(store.as_ref(), task).await.unwrap();
        }
        let mut launcher = MockTaskLauncher::new();
        launcher.expect_task_status().returning(|id| match id {
            "t1" => Ok(TaskStatus::Succeeded),
            "t2" => Ok(TaskStatus::Failed),
            _ => Err(PluginError::CurrentlyUnresolvable("orca unavailable".into())),
        });
        let publisher = RecordingPublisher::new();
        let agent = TaskMonitorAgent::new(
            Repositories::from_store(store.clone()),
            Arc::new(launcher),
            publisher.clone(),
            clock,
        );

        agent.invoke_agent().await.unwrap();

        let in_flight: Vec<String> = store.all_in_flight().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(in_flight, ["t3"]);
        let test = store.last_event(&cluster("test").id).await.unwrap().unwrap();
        assert_eq!(test.name(), "ResourceTaskSucceeded");
        let staging = store.last_event(&cluster("staging").id).await.unwrap().unwrap();
        assert_eq!(staging.name(), "ResourceTaskFailed");
        assert_eq!(publisher.events().len(), 2);
    }
}
