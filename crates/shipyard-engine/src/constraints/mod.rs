//! Built-in constraint evaluators
//!
//! - [`ArtifactUsedConstraintEvaluator`]: implicit; some resource in the
//!   environment deploys the artifact
//! - [`DependsOnConstraintEvaluator`]: the version reached another environment
//! - [`AllowedTimesConstraintEvaluator`]: promotion windows
//! - [`ManualJudgementConstraintEvaluator`]: stateful human approval

mod allowed_times;
mod artifact_used;
mod depends_on;
mod manual_judgement;

use std::sync::Arc;

use shipyard_core::{ArtifactRepository, Clock, ConstraintEvaluator, DeliveryConfigRepository};

pub use allowed_times::AllowedTimesConstraintEvaluator;
pub use artifact_used::ArtifactUsedConstraintEvaluator;
pub use depends_on::DependsOnConstraintEvaluator;
pub use manual_judgement::ManualJudgementConstraintEvaluator;

/// Every built-in evaluator
pub fn builtin(
    delivery_configs: Arc<dyn DeliveryConfigRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    clock: Arc<dyn Clock>,
) -> Vec<Arc<dyn ConstraintEvaluator>> {
    vec![
        Arc::new(ArtifactUsedConstraintEvaluator),
        Arc::new(DependsOnConstraintEvaluator::new(artifacts)),
        Arc::new(AllowedTimesConstraintEvaluator::new(clock.clone())),
        Arc::new(ManualJudgementConstraintEvaluator::new(delivery_configs, clock)),
    ]
}
