//! Scheduled agents and external task control

use crate::error::{AgentError, PluginError};
use crate::model::TaskStatus;

/// Periodic, lock-guarded background work
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait::async_trait]
pub trait ScheduledAgent: Send + Sync {
    /// Lock key; one holder at a time across all schedulers
    fn lock_name(&self) -> &'static str;

    /// Lease TTL; a crashed holder is superseded after this
    fn lock_timeout_seconds(&self) -> u64;

    /// Run once
    async fn invoke_agent(&self) -> Result<(), AgentError>;
}

/// Control over launched external tasks
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait::async_trait]
pub trait TaskLauncher: Send + Sync {
    /// Cancel tasks on behalf of `user`
    async fn cancel_tasks(&self, task_ids: &[String], user: &str) -> Result<(), PluginError>;

    /// Current status of a task
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, PluginError>;
}
