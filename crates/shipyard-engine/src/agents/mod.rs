//! Built-in scheduled agents
//!
//! - [`TaskMonitorAgent`]: follows launched tasks to completion
//! - [`PreviewEnvironmentCleanupAgent`]: deletes preview environments left
//!   without resources

mod preview_cleanup;
mod task_monitor;

pub use preview_cleanup::PreviewEnvironmentCleanupAgent;
pub use task_monitor::TaskMonitorAgent;
