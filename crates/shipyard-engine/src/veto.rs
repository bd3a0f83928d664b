//! Actuation vetoes
//!
//! [`VetoEnforcer`] asks each registered [`Veto`] in registration order;
//! the first denial wins. [`UnhappyVeto`] blocks a resource whose diff has
//! persisted across too many checks.

use std::sync::Arc;

use shipyard_core::{DiffFingerprintRepository, RepositoryError, Resource, Veto, VetoResponse};
use tracing::debug;

/// Name reported when every veto allows actuation
const ENFORCER: &str = "VetoEnforcer";

/// Runs registered vetoes against a resource
#[derive(Clone, Default)]
pub struct VetoEnforcer {
    vetoes: Vec<Arc<dyn Veto>>,
}

impl VetoEnforcer {
    pub fn new(vetoes: Vec<Arc<dyn Veto>>) -> Self {
        Self { vetoes }
    }

    /// Register a veto after the existing ones
    pub fn register(&mut self, veto: Arc<dyn Veto>) {
        self.vetoes.push(veto);
    }

    /// First denial, or an allow
    pub async fn can_check(&self, resource: &Resource) -> Result<VetoResponse, RepositoryError> {
        for veto in &self.vetoes {
            let response = veto.check(resource).await?;
            if !response.allowed {
                debug!("{} vetoed actuation of {}", veto.name(), resource.id);
                return Ok(response);
            }
        }
        Ok(VetoResponse::allow(ENFORCER))
    }
}

/// Status suggested for a resource stuck with the same diff
pub const UNHAPPY_STATUS: &str = "UNHAPPY";

/// Denies actuation once the same diff was seen more than `max_diff_count` times
///
/// The count resets whenever a check finds no diff, so a resource that
/// recovers and drifts again gets fresh attempts.
pub struct UnhappyVeto {
    fingerprints: Arc<dyn DiffFingerprintRepository>,
    max_diff_count: u32,
}

impl UnhappyVeto {
    pub fn new(fingerprints: Arc<dyn DiffFingerprintRepository>, max_diff_count: u32) -> Self {
        Self {
            fingerprints,
            max_diff_count,
        }
    }
}

#[async_trait::async_trait]
impl Veto for UnhappyVeto {
    fn name(&self) -> &'static str {
        "UnhappyVeto"
    }

    async fn check(&self, resource: &Resource) -> Result<VetoResponse, RepositoryError> {
        let count = self.fingerprints.diff_count(&resource.id).await?;
        if count > self.max_diff_count {
            return Ok(VetoResponse::deny(
                self.name(),
                format!(
                    "{} still differs from its desired state after {} attempts",
                    resource.id, self.max_diff_count
                ),
            )
            .with_veto_artifact(UNHAPPY_STATUS));
        }
        Ok(VetoResponse::allow(self.name()))
    }
}
