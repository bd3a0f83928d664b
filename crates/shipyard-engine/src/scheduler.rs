//! Check scheduler
//!
//! Periodic driver behind a liveness gate. While the gate is down every
//! tick is a no-op that touches neither the repositories nor the checkers.
//! While up, each tick:
//! - pulls a batch of due resources and checks them concurrently
//! - pulls a batch of due delivery configs and runs their promotion checks
//!   concurrently
//! - runs each scheduled agent whose lock it wins
//!
//! A failing or slow check never holds up the rest of its batch; each one
//! runs in its own task and the batch waits for it at most
//! `check_timeout_secs`. A check past that deadline is not cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shipyard_core::settings::SchedulerSettings;
use shipyard_core::{DeliveryConfig, RepositoryError, Resource, ScheduledAgent};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::actuator::ResourceActuator;
use crate::promotion::EnvironmentPromotionChecker;
use crate::repositories::Repositories;

/// Something that checks one resource
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceCheck: Send + Sync {
    async fn check_resource(&self, resource: &Resource) -> Result<(), RepositoryError>;
}

/// Something that runs the promotion check of one delivery config
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EnvironmentCheck: Send + Sync {
    async fn check_environments(&self, config: &DeliveryConfig) -> Result<(), RepositoryError>;
}

#[async_trait::async_trait]
impl ResourceCheck for ResourceActuator {
    async fn check_resource(&self, resource: &Resource) -> Result<(), RepositoryError> {
        ResourceActuator::check_resource(self, resource).await
    }
}

#[async_trait::async_trait]
impl EnvironmentCheck for EnvironmentPromotionChecker {
    async fn check_environments(&self, config: &DeliveryConfig) -> Result<(), RepositoryError> {
        EnvironmentPromotionChecker::check_environments(self, config).await
    }
}

/// Drives resource checks, promotion checks and scheduled agents
pub struct CheckScheduler {
    repositories: Repositories,
    resources: Arc<dyn ResourceCheck>,
    environments: Arc<dyn EnvironmentCheck>,
    agents: Vec<Arc<dyn ScheduledAgent>>,
    settings: SchedulerSettings,
    enabled: AtomicBool,
}

impl CheckScheduler {
    pub fn new(
        repositories: Repositories,
        resources: Arc<dyn ResourceCheck>,
        environments: Arc<dyn EnvironmentCheck>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            repositories,
            resources,
            environments,
            agents: Vec::new(),
            enabled: AtomicBool::new(settings.enabled_on_start),
            settings,
        }
    }

    /// With scheduled agents, run in order on each agent tick
    #[must_use]
    pub fn with_agents(mut self, agents: Vec<Arc<dyn ScheduledAgent>>) -> Self {
        self.agents = agents;
        self
    }

    /// Open the liveness gate
    pub fn on_application_up(&self) {
        info!("application up, enabling scheduled checks");
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Close the liveness gate
    pub fn on_application_down(&self) {
        info!("application down, disabling scheduled checks");
        self.enabled.store(false, Ordering::SeqCst);
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Check one batch of due resources; returns how many were dispatched
    pub async fn check_resources(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let due = match self
            .repositories
            .resources
            .resources_due_for_check(
                self.settings.resource_check_min_age(),
                self.settings.resource_check_batch_size,
            )
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!("unable to fetch resources due for check: {}", e);
                return 0;
            }
        };

        let count = due.len();
        let timeout = self.settings.check_timeout();
        let mut checks = JoinSet::new();
        for resource in due {
            let checker = Arc::clone(&self.resources);
            let label = format!("check of {}", resource.id);
            checks.spawn(supervise(
                async move { checker.check_resource(&resource).await },
                timeout,
                label,
            ));
        }
        drain(checks, "resource check").await;
        debug!("checked {} resource(s)", count);
        count
    }

    /// Run promotion checks for one batch of due delivery configs; returns
    /// how many were dispatched
    pub async fn check_environments(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let due = match self
            .repositories
            .delivery_configs
            .delivery_configs_due_for_check(
                self.settings.environment_check_min_age(),
                self.settings.environment_check_batch_size,
            )
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!("unable to fetch delivery configs due for check: {}", e);
                return 0;
            }
        };

        let count = due.len();
        let timeout = self.settings.check_timeout();
        let mut checks = JoinSet::new();
        for config in due {
            let checker = Arc::clone(&self.environments);
            let label = format!("promotion check of {}", config.name);
            checks.spawn(supervise(
                async move { checker.check_environments(&config).await },
                timeout,
                label,
            ));
        }
        drain(checks, "promotion check").await;
        debug!("checked {} delivery config(s)", count);
        count
    }

    /// Run every agent whose lock this scheduler acquires; returns how many ran
    pub async fn invoke_agents(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let mut invoked = 0;
        for agent in &self.agents {
            let name = agent.lock_name();
            match self
                .repositories
                .agent_locks
                .try_acquire_lock(name, agent.lock_timeout_seconds())
                .await
            {
                Ok(true) => {
                    invoked += 1;
                    if let Err(e) = agent.invoke_agent().await {
                        error!("agent {} failed: {}", name, e);
                    }
                }
                Ok(false) => debug!("lock on {} is held elsewhere", name),
                Err(e) => error!("unable to acquire lock on {}: {}", name, e),
            }
        }
        invoked
    }

    /// Tick forever
    pub async fn run(&self) {
        let mut checks = ticker(self.settings.check_interval_secs);
        let mut agents = ticker(self.settings.agent_interval_secs);
        loop {
            tokio::select! {
                _ = checks.tick() => {
                    tokio::join!(self.check_resources(), self.check_environments());
                }
                _ = agents.tick() => {
                    self.invoke_agents().await;
                }
            }
        }
    }
}

fn ticker(secs: u64) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Run `check` in its own task and wait for it up to `timeout`
///
/// A check that outlives `timeout` is left running to completion and logs
/// its own outcome; only the batch stops waiting for it.
async fn supervise<F>(check: F, timeout: Duration, label: String)
where
    F: Future<Output = Result<(), RepositoryError>> + Send + 'static,
{
    let outcome = label.clone();
    let mut handle = tokio::spawn(async move {
        if let Err(e) = check.await {
            error!("{} failed: {}", outcome, e);
        }
    });
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{} aborted: {}", label, e),
        Err(_) => warn!(
            "{} still running after {:?}, no longer waiting for it",
            label, timeout
        ),
    }
}

async fn drain(mut tasks: JoinSet<()>, what: &str) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("{} task aborted: {}", what, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use shipyard_core::plugins::MockScheduledAgent;
    use shipyard_core::AgentError;
    use shipyard_test_utils::{clock, delivery_config, seeded_store};

    fn settings() -> SchedulerSettings {
        SchedulerSettings::default()
            .with_resource_batch(0, 10)
            .with_environment_batch(0, 10)
    }

    async fn scheduler(resources: MockResourceCheck, environments: MockEnvironmentCheck) -> CheckScheduler {
        let store = seeded_store(&delivery_config(), clock()).await;
        CheckScheduler::new(
            Repositories::from_store(store),
            Arc::new(resources),
            Arc::new(environments),
            settings(),
        )
    }

    fn never_checks_environments() -> MockEnvironmentCheck {
        let mut environments = MockEnvironmentCheck::new();
        environments.expect_check_environments().times(0);
        environments
    }

    #[tokio::test]
    async fn disabled_scheduler_never_checks_resources() {
        let mut resources = MockResourceCheck::new();
        resources.expect_check_resource().times(0);
        let scheduler = scheduler(resources, never_checks_environments()).await;

        assert!(!scheduler.is_enabled());
        assert_eq!(scheduler.check_resources().await, 0);
        assert_eq!(scheduler.check_environments().await, 0);
        assert_eq!(scheduler.invoke_agents().await, 0);
    }

    #[tokio::test]
    async fn enabled_scheduler_checks_every_due_resource() {
        let mut resources = MockResourceCheck::new();
        resources.expect_check_resource().times(2).returning(|_| Ok(()));
        let scheduler = scheduler(resources, never_checks_environments()).await;
        scheduler.on_application_up();

        assert_eq!(scheduler.check_resources().await, 2);
    }

    #[tokio::test]
    async fn one_failing_check_does_not_stop_the_batch() {
        let mut resources = MockResourceCheck::new();
        resources
            .expect_check_resource()
            .withf(|resource| resource.id.as_str() == "ec2:cluster:test:fnord")
            .times(1)
            .returning(|_| Err(RepositoryError::Backend("connection reset".into())));
        resources
            .expect_check_resource()
            .withf(|resource| resource.id.as_str() == "ec2:cluster:staging:fnord")
            .times(1)
            .returning(|_| Ok(()));
        let scheduler = scheduler(resources, never_checks_environments()).await;
        scheduler.on_application_up();

        assert_eq!(scheduler.check_resources().await, 2);
    }

    struct SlowCheck {
        finished: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ResourceCheck for SlowCheck {
        async fn check_resource(&self, _resource: &Resource) -> Result<(), RepositoryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_checks_run_to_completion_past_the_timeout() {
        let store = seeded_store(&delivery_config(), clock()).await;
        let slow = Arc::new(SlowCheck {
            finished: AtomicUsize::new(0),
        });
        let scheduler = CheckScheduler::new(
            Repositories::from_store(store),
            slow.clone(),
            Arc::new(never_checks_environments()),
            SchedulerSettings {
                check_timeout_secs: 1,
                ..settings()
            },
        );
        scheduler.on_application_up();

        assert_eq!(scheduler.check_resources().await, 2);
        assert_eq!(slow.finished.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(slow.finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn going_down_closes_the_gate() {
        let mut resources = MockResourceCheck::new();
        resources.expect_check_resource().times(0);
        let scheduler = scheduler(resources, never_checks_environments()).await;

        scheduler.on_application_up();
        scheduler.on_application_down();

        assert_eq!(scheduler.check_resources().await, 0);
    }

    #[tokio::test]
    async fn due_delivery_configs_are_checked() {
        let mut resources = MockResourceCheck::new();
        resources.expect_check_resource().times(0);
        let mut environments = MockEnvironmentCheck::new();
        environments
            .expect_check_environments()
            .withf(|config| config.name == "fnord-manifest")
            .times(1)
            .returning(|_| Ok(()));
        let scheduler = scheduler(resources, environments).await;
        scheduler.on_application_up();

        assert_eq!(scheduler.check_environments().await, 1);
    }

    #[tokio::test]
    async fn agents_run_only_under_their_lock() {
        let store = seeded_store(&delivery_config(), clock()).await;
        let agent = |times: usize| -> Arc<dyn ScheduledAgent> {
            let mut agent = MockScheduledAgent::new();
            agent.expect_lock_name().return_const("cleanup");
            agent.expect_lock_timeout_seconds().return_const(600_u64);
            agent
                .expect_invoke_agent()
                .times(times)
                .returning(|| {
                    Err(AgentError::Failed {
                        agent: "cleanup".into(),
                        message: "boom".into(),
                    })
                });
            Arc::new(agent)
        };
        let build = |agent: Arc<dyn ScheduledAgent>| {
            let mut resources = MockResourceCheck::new();
            resources.expect_check_resource().times(0);
            let scheduler = CheckScheduler::new(
                Repositories::from_store(store.clone()),
                Arc::new(resources),
                Arc::new(never_checks_environments()),
                settings(),
            )
            .with_agents(vec![agent]);
            scheduler.on_application_up();
            scheduler
        };
        let first = build(agent(1));
        let second = build(agent(0));

        assert_eq!(first.invoke_agents().await, 1);
        assert_eq!(second.invoke_agents().await, 0);
    }
}
