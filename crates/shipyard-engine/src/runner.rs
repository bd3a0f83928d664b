//! Constraint runner
//!
//! For one (delivery config, environment, artifact) context, finds the
//! newest version that may be promoted and queues it for approval:
//! - vetoed versions never reach an evaluator
//! - stateless evaluators (implicit first, then declared) run before
//!   stateful ones; one failure short-circuits the version
//! - a version waiting on a pending judgement stops the walk and is not queued
//! - versions left pending from earlier checks are re-evaluated and
//!   queued if they now pass

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use shipyard_core::{
    ArtifactRepository, ConstraintEvaluator, ConstraintStatus, DeliveryArtifact, DeliveryConfig,
    DeliveryConfigRepository, Environment, EvaluationError,
};
use tracing::{debug, warn};

/// Constraint evaluators keyed by constraint type
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: Vec<Arc<dyn ConstraintEvaluator>>,
    by_type: HashMap<&'static str, usize>,
}

impl EvaluatorRegistry {
    /// Registry over `evaluators`
    pub fn new(evaluators: impl IntoIterator<Item = Arc<dyn ConstraintEvaluator>>) -> Self {
        let mut registry = Self::default();
        for evaluator in evaluators {
            registry.register(evaluator);
        }
        registry
    }

    /// Register an evaluator, replacing one of the same type
    pub fn register(&mut self, evaluator: Arc<dyn ConstraintEvaluator>) {
        let key = evaluator.supported_type();
        if let Some(&index) = self.by_type.get(key) {
            self.evaluators[index] = evaluator;
        } else {
            self.by_type.insert(key, self.evaluators.len());
            self.evaluators.push(evaluator);
        }
    }

    /// Evaluator for a constraint type
    #[must_use]
    pub fn for_type(&self, constraint_type: &str) -> Option<&Arc<dyn ConstraintEvaluator>> {
        self.by_type
            .get(constraint_type)
            .and_then(|&index| self.evaluators.get(index))
    }

    /// Evaluators that run without being declared
    pub fn implicit(&self) -> impl Iterator<Item = &Arc<dyn ConstraintEvaluator>> {
        self.evaluators.iter().filter(|e| e.is_implicit())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

/// Inputs of one runner check
#[derive(Debug, Clone)]
pub struct EnvironmentContext<'a> {
    pub delivery_config: &'a DeliveryConfig,
    pub environment: &'a Environment,
    pub artifact: &'a DeliveryArtifact,
    /// Known versions, newest first
    pub versions: Vec<String>,
    /// Versions vetoed in the environment
    pub vetoed: HashSet<String>,
}

impl<'a> EnvironmentContext<'a> {
    /// Context with no vetoed versions
    #[must_use]
    pub fn new(
        delivery_config: &'a DeliveryConfig,
        environment: &'a Environment,
        artifact: &'a DeliveryArtifact,
        versions: Vec<String>,
    ) -> Self {
        Self {
            delivery_config,
            environment,
            artifact,
            versions,
            vetoed: HashSet::new(),
        }
    }

    /// With vetoed versions
    #[must_use]
    pub fn with_vetoed(mut self, vetoed: impl IntoIterator<Item = String>) -> Self {
        self.vetoed.extend(vetoed);
        self
    }

    /// Known and not vetoed
    #[must_use]
    pub fn is_eligible(&self, version: &str) -> bool {
        !self.vetoed.contains(version) && self.versions.iter().any(|v| v == version)
    }

    /// Non-vetoed versions, newest first
    pub fn eligible(&self) -> impl Iterator<Item = &str> {
        self.versions
            .iter()
            .map(String::as_str)
            .filter(|v| !self.vetoed.contains(*v))
    }
}

/// Decides which version of an artifact to queue for approval in an environment
pub struct EnvironmentConstraintRunner {
    delivery_configs: Arc<dyn DeliveryConfigRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    evaluators: EvaluatorRegistry,
}

impl EnvironmentConstraintRunner {
    /// Create a runner
    pub fn new(
        delivery_configs: Arc<dyn DeliveryConfigRepository>,
        artifacts: Arc<dyn ArtifactRepository>,
        evaluators: EvaluatorRegistry,
    ) -> Self {
        Self {
            delivery_configs,
            artifacts,
            evaluators,
        }
    }

    /// Registered evaluators
    #[inline]
    #[must_use]
    pub fn evaluators(&self) -> &EvaluatorRegistry {
        &self.evaluators
    }

    /// Evaluate the context and queue what passes
    pub async fn check_environment(&self, ctx: &EnvironmentContext<'_>) -> Result<(), EvaluationError> {
        let config = ctx.delivery_config;
        let environment = ctx.environment;
        let artifact = ctx.artifact;

        let mut pending: Vec<String> = if self.has_stateful_constraints(environment) {
            self.delivery_configs
                .pending_constraint_versions_for(&config.name, &environment.name, &artifact.reference)
                .await?
                .into_iter()
                .filter(|v| ctx.is_eligible(v))
                .collect()
        } else {
            Vec::new()
        };

        let mut candidate = None;
        for version in ctx.eligible() {
            pending.retain(|p| p != version);
            if !self
                .check_stateless_constraints(artifact, version, config, environment)
                .await?
            {
                continue;
            }
            if environment.constraints.is_empty()
                || self
                    .check_stateful_constraints(artifact, version, config, environment)
                    .await?
            {
                candidate = Some(version);
                break;
            }
            if self.awaiting_judgement(ctx, version).await? {
                debug!(
                    "{} {} in {}/{} awaits a pending constraint",
                    artifact, version, config.name, environment.name
                );
                break;
            }
        }

        match candidate {
            Some(version) => {
                let latest = self
                    .artifacts
                    .latest_version_approved_in(config, artifact, &environment.name)
                    .await?;
                if latest.as_deref() == Some(version) {
                    debug!(
                        "{} {} is already approved in {}/{}",
                        artifact, version, config.name, environment.name
                    );
                } else {
                    self.queue(ctx, version).await?;
                }
            }
            None => debug!(
                "no version of {} can be promoted to {}/{}",
                artifact, config.name, environment.name
            ),
        }

        for version in pending {
            if self
                .check_stateless_constraints(artifact, &version, config, environment)
                .await?
                && self
                    .check_stateful_constraints(artifact, &version, config, environment)
                    .await?
            {
                self.queue(ctx, &version).await?;
            }
        }

        Ok(())
    }

    /// Implicit evaluators, then the environment's declared stateless constraints
    ///
    /// A declared constraint with no registered evaluator fails.
    pub async fn check_stateless_constraints(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError> {
        for evaluator in self.evaluators.implicit() {
            let declared = environment
                .constraints
                .iter()
                .any(|c| c.constraint_type() == evaluator.supported_type());
            if declared {
                continue;
            }
            if !evaluator.can_promote(artifact, version, config, environment).await? {
                debug!(
                    "{} {} blocked in {} by implicit {}",
                    artifact,
                    version,
                    environment.name,
                    evaluator.supported_type()
                );
                return Ok(false);
            }
        }

        for constraint in &environment.constraints {
            let constraint_type = constraint.constraint_type();
            match self.evaluators.for_type(constraint_type) {
                Some(evaluator) if evaluator.is_stateful() => {}
                Some(evaluator) => {
                    if !evaluator.can_promote(artifact, version, config, environment).await? {
                        debug!(
                            "{} {} blocked in {} by {}",
                            artifact, version, environment.name, constraint_type
                        );
                        return Ok(false);
                    }
                }
                None => {
                    warn!(
                        "no evaluator for {} constraint in {}/{}",
                        constraint_type, config.name, environment.name
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// The environment's declared stateful constraints
    pub async fn check_stateful_constraints(
        &self,
        artifact: &DeliveryArtifact,
        version: &str,
        config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError> {
        for constraint in &environment.constraints {
            let Some(evaluator) = self.evaluators.for_type(constraint.constraint_type()) else {
                return Ok(false);
            };
            if evaluator.is_stateful()
                && !evaluator.can_promote(artifact, version, config, environment).await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Declares a constraint whose registered evaluator is stateful
    fn has_stateful_constraints(&self, environment: &Environment) -> bool {
        environment.constraints.iter().any(|c| {
            self.evaluators
                .for_type(c.constraint_type())
                .is_some_and(|e| e.is_stateful())
        })
    }

    async fn awaiting_judgement(
        &self,
        ctx: &EnvironmentContext<'_>,
        version: &str,
    ) -> Result<bool, EvaluationError> {
        for constraint in &ctx.environment.constraints {
            let stateful = self
                .evaluators
                .for_type(constraint.constraint_type())
                .is_some_and(|e| e.is_stateful());
            if !stateful {
                continue;
            }
            let state = self
                .delivery_configs
                .get_constraint_state(
                    &ctx.delivery_config.name,
                    &ctx.environment.name,
                    &ctx.artifact.reference,
                    version,
                    constraint.constraint_type(),
                )
                .await?;
            if state.is_some_and(|s| s.status == ConstraintStatus::Pending) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn queue(&self, ctx: &EnvironmentContext<'_>, version: &str) -> Result<(), EvaluationError> {
        debug!(
            "queueing {} {} for approval in {}/{}",
            ctx.artifact, version, ctx.delivery_config.name, ctx.environment.name
        );
        self.delivery_configs
            .queue_all_constraints_approved(
                &ctx.delivery_config.name,
                &ctx.environment.name,
                &ctx.artifact.reference,
                version,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::model::constraint::{
        DEFAULT_JUDGEMENT_TIMEOUT_SECS, DEPENDS_ON, MANUAL_JUDGEMENT,
    };
    use shipyard_core::plugins::MockConstraintEvaluator;
    use shipyard_core::{Constraint, ConstraintState};
    use shipyard_store_memory::InMemoryStore;
    use shipyard_test_utils::{cluster, delivery_config, docker_artifact, start_time};

    const VERSIONS: [&str; 4] = ["2.0", "1.2", "1.1", "1.0"];

    fn versions() -> Vec<String> {
        VERSIONS.iter().map(ToString::to_string).collect()
    }

    fn evaluator(key: &'static str, implicit: bool, stateful: bool) -> MockConstraintEvaluator {
        let mut evaluator = MockConstraintEvaluator::new();
        evaluator.expect_supported_type().return_const(key);
        evaluator.expect_is_implicit().return_const(implicit);
        evaluator.expect_is_stateful().return_const(stateful);
        evaluator
    }

    /// Passes every version; expects exactly `calls` for each listed version
    fn implicit_passing(calls: &[(&'static str, usize)]) -> MockConstraintEvaluator {
        let mut implicit = evaluator("artifact-used", true, false);
        for &(version, times) in calls {
            implicit
                .expect_can_promote()
                .withf(move |_, v, _, _| v == version)
                .times(times)
                .returning(|_, _, _, _| Ok(true));
        }
        implicit
            .expect_can_promote()
            .returning(|_, _, _, _| Ok(true));
        implicit
    }

    fn judgement() -> Constraint {
        Constraint::ManualJudgement {
            timeout_secs: DEFAULT_JUDGEMENT_TIMEOUT_SECS,
        }
    }

    fn depends_on() -> Constraint {
        Constraint::DependsOn {
            environment: "test".into(),
        }
    }

    fn staging(constraints: Vec<Constraint>) -> Environment {
        let mut environment = Environment::new("staging").with_resource(cluster("staging"));
        environment.constraints = constraints;
        environment
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        config: DeliveryConfig,
        artifact: DeliveryArtifact,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                config: delivery_config(),
                artifact: docker_artifact(),
            }
        }

        fn runner(&self, evaluators: Vec<MockConstraintEvaluator>) -> EnvironmentConstraintRunner {
            EnvironmentConstraintRunner::new(
                self.store.clone(),
                self.store.clone(),
                EvaluatorRegistry::new(
                    evaluators
                        .into_iter()
                        .map(|e| Arc::new(e) as Arc<dyn ConstraintEvaluator>),
                ),
            )
        }

        async fn queued(&self, environment: &str) -> Vec<String> {
            self.store
                .get_queued_constraint_approvals(&self.config.name, environment, &self.artifact.reference)
                .await
                .unwrap()
        }

        async fn store_state(&self, environment: &str, version: &str, status: ConstraintStatus) {
            self.store_state_of(MANUAL_JUDGEMENT, environment, version, status).await;
        }

        async fn store_state_of(
            &self,
            constraint_type: &str,
            environment: &str,
            version: &str,
            status: ConstraintStatus,
        ) {
            let state = ConstraintState::pending(
                &self.config.name,
                environment,
                &self.artifact.reference,
                version,
                constraint_type,
                start_time(),
            );
            let state = if status == ConstraintStatus::Pending {
                state
            } else {
                state.judged(status, "someone", start_time(), None)
            };
            self.store.store_constraint_state(state).await.unwrap();
        }
    }

    #[tokio::test]
    async fn no_versions_is_not_an_error() {
        let f = Fixture::new();
        let runner = f.runner(vec![implicit_passing(&[])]);
        let environment = staging(vec![depends_on()]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, Vec::new());
        runner.check_environment(&ctx).await.unwrap();

        assert!(f.queued("staging").await.is_empty());
    }

    #[tokio::test]
    async fn unconstrained_environment_queues_latest_version() {
        let f = Fixture::new();
        let runner = f.runner(vec![implicit_passing(&[("2.0", 1), ("1.2", 0)])]);
        let environment = staging(Vec::new());

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["2.0"]);
    }

    #[tokio::test]
    async fn vetoed_versions_never_reach_an_evaluator() {
        let f = Fixture::new();
        let runner = f.runner(vec![implicit_passing(&[("2.0", 0), ("1.2", 1)])]);
        let environment = staging(Vec::new());

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions())
            .with_vetoed(["2.0".to_string()]);
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["1.2"]);
    }

    #[tokio::test]
    async fn latest_approved_version_is_not_requeued() {
        let f = Fixture::new();
        f.store
            .approve_version_for(&f.config, &f.artifact, "2.0", "staging")
            .await
            .unwrap();
        let runner = f.runner(vec![implicit_passing(&[])]);
        let environment = staging(Vec::new());

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert!(f.queued("staging").await.is_empty());
    }

    #[tokio::test]
    async fn only_the_latest_passing_version_is_checked() {
        let f = Fixture::new();
        let mut stateless = evaluator(DEPENDS_ON, false, false);
        stateless
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        let runner = f.runner(vec![implicit_passing(&[("2.0", 1), ("1.2", 0)]), stateless]);
        let environment = staging(vec![depends_on()]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["2.0"]);
    }

    #[tokio::test]
    async fn stateful_constraints_are_skipped_when_stateless_fail() {
        let f = Fixture::new();
        f.store_state("staging", "2.0", ConstraintStatus::Pending).await;
        f.store_state("staging", "1.2", ConstraintStatus::OverridePass).await;

        let mut stateless = evaluator(DEPENDS_ON, false, false);
        stateless
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .returning(|_, _, _, _| Ok(false));
        stateless
            .expect_can_promote()
            .withf(|_, v, _, _| v == "1.2")
            .returning(|_, _, _, _| Ok(true));
        let mut stateful = evaluator(MANUAL_JUDGEMENT, false, true);
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .times(0)
            .returning(|_, _, _, _| Ok(false));
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "1.2")
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        let runner = f.runner(vec![implicit_passing(&[]), stateless, stateful]);
        let environment = staging(vec![depends_on(), judgement()]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["1.2"]);
    }

    #[tokio::test]
    async fn pending_judgement_stops_the_walk() {
        let f = Fixture::new();
        f.store_state("staging", "2.0", ConstraintStatus::Pending).await;

        let mut stateful = evaluator(MANUAL_JUDGEMENT, false, true);
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .times(1)
            .returning(|_, _, _, _| Ok(false));
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v != "2.0")
            .times(0)
            .returning(|_, _, _, _| Ok(true));
        let runner = f.runner(vec![implicit_passing(&[]), stateful]);
        let environment = staging(vec![judgement()]);

        let ctx = EnvironmentContext::new(
            &f.config,
            &environment,
            &f.artifact,
            vec!["2.0".into(), "1.2".into(), "1.1".into()],
        );
        runner.check_environment(&ctx).await.unwrap();

        assert!(f.queued("staging").await.is_empty());
    }

    #[tokio::test]
    async fn older_pending_versions_are_queued_once_judged() {
        let f = Fixture::new();
        f.store_state("staging", "2.0", ConstraintStatus::Pending).await;
        f.store_state("staging", "1.2", ConstraintStatus::Pending).await;

        let mut stateful = evaluator(MANUAL_JUDGEMENT, false, true);
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .returning(|_, _, _, _| Ok(false));
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "1.2")
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        let runner = f.runner(vec![implicit_passing(&[]), stateful]);
        let environment = staging(vec![judgement()]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["1.2"]);
    }

    #[tokio::test]
    async fn stateful_plugin_under_a_builtin_key_keeps_pending_fairness() {
        let f = Fixture::new();
        f.store_state_of(DEPENDS_ON, "staging", "2.0", ConstraintStatus::Pending).await;
        f.store_state_of(DEPENDS_ON, "staging", "1.2", ConstraintStatus::Pending).await;

        let mut stateful = evaluator(DEPENDS_ON, false, true);
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .returning(|_, _, _, _| Ok(false));
        stateful
            .expect_can_promote()
            .withf(|_, v, _, _| v == "1.2")
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        let runner = f.runner(vec![implicit_passing(&[]), stateful]);
        let environment = staging(vec![depends_on()]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["1.2"]);
    }

    #[tokio::test]
    async fn plugin_constraint_types_are_dispatched_to_their_evaluator() {
        let f = Fixture::new();
        let mut canary = evaluator("canary", false, false);
        canary
            .expect_can_promote()
            .withf(|_, v, _, _| v == "2.0")
            .times(1)
            .returning(|_, _, _, _| Ok(false));
        canary
            .expect_can_promote()
            .withf(|_, v, _, _| v == "1.2")
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        let runner = f.runner(vec![implicit_passing(&[]), canary]);
        let environment = staging(vec![Constraint::custom("canary")]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert_eq!(f.queued("staging").await, ["1.2"]);
    }

    #[tokio::test]
    async fn undeclared_evaluator_fails_closed() {
        let f = Fixture::new();
        let runner = f.runner(vec![implicit_passing(&[])]);
        let environment = staging(vec![depends_on()]);

        let ctx = EnvironmentContext::new(&f.config, &environment, &f.artifact, versions());
        runner.check_environment(&ctx).await.unwrap();

        assert!(f.queued("staging").await.is_empty());
    }

    #[test]
    fn registry_replaces_evaluators_of_the_same_type() {
        let registry = EvaluatorRegistry::new(vec![
            Arc::new(evaluator(DEPENDS_ON, false, false)) as Arc<dyn ConstraintEvaluator>,
            Arc::new(evaluator(DEPENDS_ON, false, true)),
            Arc::new(evaluator("artifact-used", true, false)),
        ]);

        assert_eq!(registry.len(), 2);
        assert!(registry.for_type(DEPENDS_ON).unwrap().is_stateful());
        assert_eq!(registry.implicit().count(), 1);
        assert!(registry.for_type(MANUAL_JUDGEMENT).is_none());
    }
}
