use std::sync::Arc;

use chrono::Duration;
use shipyard_core::model::constraint::MANUAL_JUDGEMENT;
use shipyard_core::{
    Clock, Constraint, ConstraintEvaluator, ConstraintState, ConstraintStatus, DeliveryArtifact,
    DeliveryConfig, DeliveryConfigRepository, Environment, EvaluationError,
};
use tracing::info;

/// Identity recorded on judgements the engine makes itself
const JUDGED_BY: &str = "shipyard";

/// Waits for a human to approve the version
///
/// The first evaluation of a version stores a `PENDING` state. A pending
/// judgement older than the constraint's timeout is failed.
pub struct ManualJudgementConstraintEvaluator {
    delivery_configs: Arc<dyn DeliveryConfigRepository>,
    clock: Arc<dyn Clock>,
}

impl ManualJudgementConstraintEvaluator {
    pub fn new(delivery_configs: Arc<dyn DeliveryConfigRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            delivery_configs,
            clock,
        }
    }
}

#[async_trait::async_trait]
impl ConstraintEvaluator for ManualJudgementConstraintEvaluator {
    fn supported_type(&self) -> &'static str {
        MANUAL_JUDGEMENT
    }

    fn is_implicit(&self) -> bool {
        false
    }

    fn is_stateful(&self) -> bool {
        true
    }

    async fn can_promote(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        delivery_config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError> {
        let timeout_secs = environment
            .constraints
            .iter()
            .find_map(|c| match c {
                Constraint::ManualJudgement { timeout_secs } => Some(*timeout_secs),
                _ => None,
            })
            .ok_or_else(|| EvaluationError::MissingConstraint {
                constraint_type: MANUAL_JUDGEMENT.to_string(),
                environment: environment.name.clone(),
            })?;

        let now = self.clock.now();
        let state = self
            .delivery_configs
            .get_constraint_state(
                &delivery_config.name,
                &environment.name,
                &artifact.reference,
                version,
                MANUAL_JUDGEMENT,
            )
            .await?;

        let Some(state) = state else {
            info!(
                "awaiting manual judgement of {} {} in {}/{}",
                artifact, version, delivery_config.name, environment.name
            );
            self.delivery_configs
                .store_constraint_state(ConstraintState::pending(
                    &delivery_config.name,
                    &environment.name,
                    &artifact.reference,
                    version,
                    MANUAL_JUDGEMENT,
                    now,
                ))
                .await?;
            return Ok(false);
        };

        match state.status {
            status if status.passes() => Ok(true),
            ConstraintStatus::Pending | ConstraintStatus::NotEvaluated => {
                let max = i64::MAX / 1000;
                let timeout = Duration::seconds(i64::try_from(timeout_secs).map_or(max, |v| v.min(max)));
                if now.signed_duration_since(state.created_at) > timeout {
                    info!(
                        "manual judgement of {} {} in {}/{} timed out",
                        artifact, version, delivery_config.name, environment.name
                    );
                    self.delivery_configs
                        .store_constraint_state(state.judged(
                            ConstraintStatus::Fail,
                            JUDGED_BY,
                            now,
                            Some(format!("not judged within {timeout_secs}s")),
                        ))
                        .await?;
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}
