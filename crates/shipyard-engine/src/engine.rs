//! Engine assembly
//!
//! [`EngineBuilder`] wires repositories, plugins and settings into the
//! component graph:
//! - built-in constraint evaluators plus any registered ones
//! - the unhappy veto ahead of registered vetoes, when enabled
//! - a logging publisher ahead of registered publishers
//! - task cancellation and task monitoring, when a task launcher is given
//! - preview cleanup, active only when enabled in settings

use std::sync::Arc;

use shipyard_core::settings::Settings;
use shipyard_core::{
    Clock, ConstraintEvaluator, EventPublisher, ResourceHandler, ScheduledAgent, SystemClock,
    TaskLauncher, Veto,
};
use tracing::info;

use crate::actuator::{HandlerRegistry, ResourceActuator};
use crate::agents::{PreviewEnvironmentCleanupAgent, TaskMonitorAgent};
use crate::canceler::EnvironmentTaskCanceler;
use crate::cleaner::EnvironmentCleaner;
use crate::constraints;
use crate::interventions::InterventionService;
use crate::pause::ActuationPauser;
use crate::promotion::EnvironmentPromotionChecker;
use crate::publisher::{FanoutPublisher, LoggingPublisher};
use crate::repositories::Repositories;
use crate::runner::{EnvironmentConstraintRunner, EvaluatorRegistry};
use crate::scheduler::CheckScheduler;
use crate::veto::{UnhappyVeto, VetoEnforcer};

/// Fully wired engine
pub struct Engine {
    /// Repositories every component shares
    pub repositories: Repositories,
    /// Periodic resource, environment and agent checks
    pub scheduler: Arc<CheckScheduler>,
    /// Resource reconciliation
    pub actuator: Arc<ResourceActuator>,
    /// Environment promotion
    pub promotion_checker: Arc<EnvironmentPromotionChecker>,
    /// Constraint evaluation
    pub runner: Arc<EnvironmentConstraintRunner>,
    /// Application and resource pauses
    pub pauser: Arc<ActuationPauser>,
    /// Pins, vetoes and judgements
    pub interventions: Arc<InterventionService>,
    /// Environment cleanup
    pub cleaner: Arc<EnvironmentCleaner>,
    /// Logging publisher fanned out to registered publishers
    pub publisher: Arc<dyn EventPublisher>,
}

impl Engine {
    /// Start wiring an engine over `repositories`
    #[inline]
    #[must_use]
    pub fn builder(repositories: Repositories, settings: Settings) -> EngineBuilder {
        EngineBuilder::new(repositories, settings)
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    repositories: Repositories,
    settings: Settings,
    clock: Arc<dyn Clock>,
    handlers: Vec<Arc<dyn ResourceHandler>>,
    evaluators: Vec<Arc<dyn ConstraintEvaluator>>,
    vetoes: Vec<Arc<dyn Veto>>,
    agents: Vec<Arc<dyn ScheduledAgent>>,
    publishers: Vec<Arc<dyn EventPublisher>>,
    launcher: Option<Arc<dyn TaskLauncher>>,
}

impl EngineBuilder {
    /// Empty builder on the system clock
    pub fn new(repositories: Repositories, settings: Settings) -> Self {
        Self {
            repositories,
            settings,
            clock: Arc::new(SystemClock),
            handlers: Vec::new(),
            evaluators: Vec::new(),
            vetoes: Vec::new(),
            agents: Vec::new(),
            publishers: Vec::new(),
            launcher: None,
        }
    }

    /// Set the clock (system clock by default)
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a resource handler
    #[inline]
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Register a constraint evaluator
    ///
    /// Replaces a built-in of the same type; a new type is declared on
    /// environments as [`Constraint::Custom`](shipyard_core::Constraint::Custom).
    #[inline]
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConstraintEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Register a veto
    #[inline]
    #[must_use]
    pub fn with_veto(mut self, veto: Arc<dyn Veto>) -> Self {
        self.vetoes.push(veto);
        self
    }

    /// Register a scheduled agent
    #[inline]
    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn ScheduledAgent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Set the launcher used to monitor and cancel tasks
    #[inline]
    #[must_use]
    pub fn with_task_launcher(mut self, launcher: Arc<dyn TaskLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Publish events to `publisher` as well
    #[inline]
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Wire everything together
    pub fn build(self) -> Engine {
        let Self {
            repositories,
            settings,
            clock,
            handlers,
            evaluators,
            vetoes,
            agents,
            publishers,
            launcher,
        } = self;

        let publisher: Arc<dyn EventPublisher> = Arc::new(publishers.into_iter().fold(
            FanoutPublisher::default().with(Arc::new(LoggingPublisher)),
            FanoutPublisher::with,
        ));

        let mut registry = EvaluatorRegistry::new(constraints::builtin(
            repositories.delivery_configs.clone(),
            repositories.artifacts.clone(),
            clock.clone(),
        ));
        for evaluator in evaluators {
            registry.register(evaluator);
        }
        let runner = Arc::new(EnvironmentConstraintRunner::new(
            repositories.delivery_configs.clone(),
            repositories.artifacts.clone(),
            registry,
        ));
        let promotion_checker = Arc::new(
            EnvironmentPromotionChecker::new(
                repositories.clone(),
                runner.clone(),
                publisher.clone(),
                clock.clone(),
            )
            .with_max_considered_versions(settings.artifacts.default_max_considered_versions),
        );

        let mut enforcer = VetoEnforcer::default();
        if settings.veto.unhappy.enabled {
            enforcer.register(Arc::new(UnhappyVeto::new(
                repositories.diff_fingerprints.clone(),
                settings.veto.unhappy.max_diff_count,
            )));
        }
        for veto in vetoes {
            enforcer.register(veto);
        }

        let pauser = Arc::new(ActuationPauser::new(
            repositories.clone(),
            publisher.clone(),
            clock.clone(),
        ));
        let actuator = Arc::new(
            ResourceActuator::new(
                repositories.clone(),
                HandlerRegistry::new(handlers),
                pauser.clone(),
                enforcer,
                publisher.clone(),
                clock.clone(),
            )
            .with_stale_after(settings.actuation.promotion_check_stale_after()),
        );

        let cleaner = Arc::new(EnvironmentCleaner::new(
            repositories.delivery_configs.clone(),
            settings.preview.cleanup_enabled,
        ));
        let mut interventions =
            InterventionService::new(repositories.clone(), publisher.clone(), clock.clone());
        let mut scheduled: Vec<Arc<dyn ScheduledAgent>> = Vec::new();
        if let Some(launcher) = launcher {
            interventions = interventions.with_canceler(Arc::new(EnvironmentTaskCanceler::new(
                repositories.delivery_configs.clone(),
                repositories.tasks.clone(),
                launcher.clone(),
            )));
            scheduled.push(Arc::new(TaskMonitorAgent::new(
                repositories.clone(),
                launcher,
                publisher.clone(),
                clock.clone(),
            )));
        }
        scheduled.push(Arc::new(PreviewEnvironmentCleanupAgent::new(
            repositories.delivery_configs.clone(),
            cleaner.clone(),
        )));
        scheduled.extend(agents);

        info!(
            "engine wired with {} handler(s), {} evaluator(s), {} agent(s)",
            actuator.handlers().len(),
            runner.evaluators().len(),
            scheduled.len()
        );
        let scheduler = Arc::new(
            CheckScheduler::new(
                repositories.clone(),
                actuator.clone(),
                promotion_checker.clone(),
                settings.scheduler,
            )
            .with_agents(scheduled),
        );

        Engine {
            repositories,
            scheduler,
            actuator,
            promotion_checker,
            runner,
            pauser,
            interventions: Arc::new(interventions),
            cleaner,
            publisher,
        }
    }
}
