//! Actuation veto contract

use crate::error::RepositoryError;
use crate::model::Resource;

/// Outcome of a veto check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoResponse {
    /// Actuation may proceed
    pub allowed: bool,
    /// Veto that decided
    pub veto_name: String,
    /// Why
    pub message: Option<String>,
    /// Also veto the artifact version being deployed
    pub veto_artifact: bool,
    /// Status to show for the resource
    pub suggested_status: Option<String>,
}

impl VetoResponse {
    /// Allow
    #[must_use]
    pub fn allow(veto_name: impl Into<String>) -> Self {
        Self {
            allowed: true,
            veto_name: veto_name.into(),
            message: None,
            veto_artifact: false,
            suggested_status: None,
        }
    }

    /// Deny
    #[must_use]
    pub fn deny(veto_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            veto_name: veto_name.into(),
            message: Some(message.into()),
            veto_artifact: false,
            suggested_status: None,
        }
    }

    /// Ask for the artifact version to be vetoed as well
    #[inline]
    #[must_use]
    pub fn with_veto_artifact(mut self, suggested_status: impl Into<String>) -> Self {
        self.veto_artifact = true;
        self.suggested_status = Some(suggested_status.into());
        self
    }
}

/// Blocks actuation of a resource
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait::async_trait]
pub trait Veto: Send + Sync {
    /// Veto name
    fn name(&self) -> &'static str;

    /// Decide for one resource
    async fn check(&self, resource: &Resource) -> Result<VetoResponse, RepositoryError>;
}
