//! Resource handler contract

use serde_json::Value;

use crate::diff::ResourceDiff;
use crate::error::PluginError;
use crate::model::{Resource, ResourceKind, Task};

/// Whether a handler will act on a diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDecision {
    /// Proceed with create/update
    pub will_act: bool,
    /// Why not, when declining
    pub message: Option<String>,
}

impl ActionDecision {
    /// Proceed
    #[inline]
    #[must_use]
    pub fn proceed() -> Self {
        Self {
            will_act: true,
            message: None,
        }
    }

    /// Decline with a reason
    #[must_use]
    pub fn decline(message: impl Into<String>) -> Self {
        Self {
            will_act: false,
            message: Some(message.into()),
        }
    }
}

/// Resolves and actuates one resource kind
///
/// Only the handler whose [`ResourceHandler::supported_kind`] equals the
/// resource's kind is ever invoked for that resource.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Handler name, reported with launched tasks
    fn name(&self) -> &'static str;

    /// Kind this handler owns
    fn supported_kind(&self) -> ResourceKind;

    /// Desired state
    async fn desired(&self, resource: &Resource) -> Result<Value, PluginError>;

    /// Current state, `None` when it does not exist
    async fn current(&self, resource: &Resource) -> Result<Option<Value>, PluginError>;

    /// Create a missing resource
    async fn create(&self, resource: &Resource, diff: &ResourceDiff)
        -> Result<Vec<Task>, PluginError>;

    /// Converge a drifted resource
    async fn update(&self, resource: &Resource, diff: &ResourceDiff)
        -> Result<Vec<Task>, PluginError>;

    /// Delete the resource
    async fn delete(&self, resource: &Resource) -> Result<Vec<Task>, PluginError>;

    /// External work for this resource is still running
    async fn actuation_in_progress(&self, resource: &Resource) -> Result<bool, PluginError>;

    /// Whether the diff is something this handler acts on
    async fn will_take_action(
        &self,
        resource: &Resource,
        diff: &ResourceDiff,
    ) -> Result<ActionDecision, PluginError>;

    /// Artifact version the desired state deploys
    fn artifact_version(&self, desired: &Value) -> Option<String>;
}
