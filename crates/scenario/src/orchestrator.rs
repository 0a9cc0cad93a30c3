//! Drives scenarios through their phases and always unwinds what they created.

use crate::context::{ScenarioContext, StepError, StepResult};
use crate::fixtures::FixtureFactory;
use crate::report::{millis, CheckRecord, Phase, PhaseReport, RunReport, ScenarioReport, TeardownReport};
use crate::scenarios::Scenario;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use toolgraph_gateway::{CallStats, RemoteStore};
use toolgraph_model::PageRequest;
use toolgraph_validate::Validator;
use tracing::{info, warn};

/// Smallest teardown budget, whatever the scenario deadline.
const MIN_TEARDOWN: Duration = Duration::from_secs(1);

/// Runs scenarios one after another against one remote store.
pub struct Orchestrator {
    store: Arc<dyn RemoteStore>,
    validator: Arc<Validator>,
    namespace: String,
    group: String,
    deadline: Duration,
    call_stats: Option<Box<dyn Fn() -> CallStats + Send + Sync>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RemoteStore>, validator: Arc<Validator>) -> Self {
        Self {
            store,
            validator,
            namespace: toolgraph_state::DEFAULT_NAMESPACE.to_string(),
            group: toolgraph_state::DEFAULT_GROUP.to_string(),
            deadline: Duration::from_secs(120),
            call_stats: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, namespace: impl Into<String>, group: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self.group = group.into();
        self
    }

    /// Per-scenario budget for every phase before teardown.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Source of per-operation call counts for the run report.
    #[must_use]
    pub fn with_call_stats(
        mut self,
        stats: impl Fn() -> CallStats + Send + Sync + 'static,
    ) -> Self {
        self.call_stats = Some(Box::new(stats));
        self
    }

    /// Budget for teardown: a quarter of the scenario deadline, counted
    /// from when teardown starts.
    pub fn teardown_deadline(&self) -> Duration {
        (self.deadline / 4).max(MIN_TEARDOWN).min(self.deadline)
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub async fn run_all(&self, scenarios: &[Box<dyn Scenario>]) -> RunReport {
        let started_at = OffsetDateTime::now_utc();
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run_scenario(scenario.as_ref()).await);
        }
        RunReport::new(
            started_at,
            reports,
            self.validator.statistics(),
            self.call_stats.as_ref().map(|stats| stats()),
        )
    }

    pub async fn run_scenario(&self, scenario: &dyn Scenario) -> ScenarioReport {
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();
        info!(target: "toolgraph::scenario", scenario = scenario.name(), "scenario started");

        let fixtures = FixtureFactory::new(&self.namespace, &self.group);
        let mut ctx = ScenarioContext::new(self.store.clone(), self.validator.clone(), fixtures);
        let deadline = tokio::time::Instant::now() + self.deadline;

        let mut phases = Vec::with_capacity(Phase::ALL.len());
        let mut aborted: Option<String> = None;
        for phase in Phase::ALL {
            if let Some(reason) = &aborted {
                phases.push(PhaseReport::skipped(phase, reason.clone()));
                continue;
            }
            let phase_clock = Instant::now();
            let outcome =
                match tokio::time::timeout_at(deadline, self.run_phase(phase, scenario, &mut ctx))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StepError::DeadlineExceeded {
                        after: self.deadline,
                    }),
                };
            let error = match outcome {
                Ok(()) => None,
                Err(err) => {
                    warn!(
                        target: "toolgraph::scenario",
                        scenario = scenario.name(),
                        %phase,
                        error = %err,
                        "phase failed"
                    );
                    if err.is_fatal() {
                        aborted = Some(format!("aborted after {phase}: {err}"));
                    }
                    Some(err.to_string())
                }
            };
            phases.push(PhaseReport::finished(
                phase,
                error,
                ctx.take_checks(),
                phase_clock.elapsed(),
            ));
        }

        let tracked = ctx.tracker().statistics();
        let teardown = self.teardown(&mut ctx).await;
        let report = ScenarioReport {
            name: scenario.name().to_string(),
            description: scenario.description().to_string(),
            started_at,
            duration_ms: millis(clock.elapsed()),
            phases,
            tracked,
            teardown,
        };
        info!(
            target: "toolgraph::scenario",
            scenario = scenario.name(),
            passed = report.passed(),
            duration_ms = report.duration_ms,
            "scenario finished"
        );
        report
    }

    async fn run_phase(
        &self,
        phase: Phase,
        scenario: &dyn Scenario,
        ctx: &mut ScenarioContext,
    ) -> StepResult {
        match phase {
            Phase::Setup => self.check_reachable(ctx).await,
            Phase::Populate => scenario.populate(ctx).await,
            Phase::Validate => scenario.validate(ctx).await,
            Phase::Mutate => scenario.mutate(ctx).await,
            Phase::Revalidate => scenario.revalidate(ctx).await,
        }
    }

    /// One cheap list call proves the remote store answers.
    async fn check_reachable(&self, ctx: &mut ScenarioContext) -> StepResult {
        let envelope = self.store.list_tools(PageRequest::first(1)).await;
        match envelope {
            Ok(envelope) if envelope.success => {
                ctx.ensure("remote store reachable", true, "ok");
                Ok(())
            }
            Ok(envelope) => {
                let message = envelope.message_or("list rejected");
                ctx.ensure("remote store reachable", false, message.clone());
                Err(StepError::Rejected {
                    operation: "toolspec/list".to_string(),
                    message,
                })
            }
            Err(err) => {
                let err = StepError::from(err);
                ctx.record(CheckRecord::fail(
                    "remote store reachable",
                    err.kind(),
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Delete everything the scenario tracked, servers before tools, then
    /// forget it. Failures are logged and counted, never returned.
    async fn teardown(&self, ctx: &mut ScenarioContext) -> TeardownReport {
        let clock = Instant::now();
        let plan = ctx.tracker().plan_teardown();
        let mut report = TeardownReport {
            planned: plan.len(),
            ..Default::default()
        };
        for violation in plan.verify(&ctx.tracker().snapshot()) {
            warn!(target: "toolgraph::scenario", %violation, "teardown plan violation");
        }

        let budget = self.teardown_deadline();
        let deadline = tokio::time::Instant::now() + budget;
        for step in plan.iter() {
            match tokio::time::timeout_at(deadline, ctx.execute_teardown_step(step)).await {
                Ok(Ok(())) => report.deleted += 1,
                Ok(Err(err)) => {
                    warn!(target: "toolgraph::scenario", %step, error = %err, "teardown step failed");
                    report.failures.push(format!("{step}: {err}"));
                }
                Err(_) => {
                    warn!(target: "toolgraph::scenario", %step, ?budget, "teardown deadline exceeded");
                    report
                        .failures
                        .push(format!("{step}: teardown deadline of {budget:?} exceeded"));
                }
            }
        }

        ctx.reset();
        report.duration_ms = millis(clock.elapsed());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::BasicDependencyFlow;
    use async_trait::async_trait;
    use toolgraph_gateway::MemoryStore;
    use toolgraph_model::{CheckError, ErrorKind};
    use toolgraph_test_utils::{GROUP, NS};

    fn orchestrator(store: Arc<MemoryStore>) -> Orchestrator {
        let validator = Arc::new(Validator::new(store.clone()));
        let stats_store = store.clone();
        Orchestrator::new(store, validator)
            .with_scope(NS, GROUP)
            .with_call_stats(move || stats_store.stats())
    }

    /// Creates one tool and one server, then fails validation with a
    /// remote outage.
    struct Outage;

    #[async_trait]
    impl Scenario for Outage {
        fn name(&self) -> &'static str {
            "outage"
        }

        fn description(&self) -> &'static str {
            "remote failure during validation"
        }

        async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
            ctx.create_tool("t").await?;
            ctx.create_server("s", &["t"]).await?;
            Ok(())
        }

        async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
            ctx.check(
                "remote lookup",
                Err::<(), _>(CheckError::remote_unavailable("toolspec/info", 3, "refused")),
            )?;
            Ok(())
        }
    }

    /// Never finishes populating.
    struct Stuck;

    #[async_trait]
    impl Scenario for Stuck {
        fn name(&self) -> &'static str {
            "stuck"
        }

        fn description(&self) -> &'static str {
            "hangs after creating a tool"
        }

        async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
            ctx.create_tool("t").await?;
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn validate(&self, _ctx: &mut ScenarioContext) -> StepResult {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fatal_error_skips_rest_but_teardown_runs() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());

        let report = orchestrator.run_scenario(&Outage).await;

        assert!(!report.passed());
        let validate = report.phase(Phase::Validate).unwrap();
        assert_eq!(validate.checks[0].kind, Some(ErrorKind::RemoteUnavailable));
        assert_eq!(
            report.phase(Phase::Mutate).unwrap().status,
            crate::report::PhaseStatus::Skipped
        );
        assert_eq!(report.teardown.planned, 2);
        assert_eq!(report.teardown.deleted, 2);
        assert_eq!(store.tool_count(), 0);
        assert_eq!(store.server_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_aborts_phases_and_teardown_gets_fresh_budget() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone()).with_deadline(Duration::from_secs(8));
        assert_eq!(orchestrator.teardown_deadline(), Duration::from_secs(2));

        let report = orchestrator.run_scenario(&Stuck).await;

        let populate = report.phase(Phase::Populate).unwrap();
        assert!(populate.detail.as_deref().unwrap().contains("deadline"));
        assert_eq!(
            report.phase(Phase::Revalidate).unwrap().status,
            crate::report::PhaseStatus::Skipped
        );
        assert!(report.teardown.is_clean());
        assert_eq!(store.tool_count(), 0);
    }

    #[tokio::test]
    async fn teardown_failure_is_counted_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());

        // the tool delete fails once inside teardown, after every phase passed
        struct FailTeardown(Arc<MemoryStore>);

        #[async_trait]
        impl Scenario for FailTeardown {
            fn name(&self) -> &'static str {
                "fail-teardown"
            }
            fn description(&self) -> &'static str {
                "teardown hits a transport failure"
            }
            async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
                ctx.create_tool("t").await?;
                Ok(())
            }
            async fn validate(&self, _ctx: &mut ScenarioContext) -> StepResult {
                Ok(())
            }
            async fn revalidate(&self, _ctx: &mut ScenarioContext) -> StepResult {
                self.0.fail_next(1);
                Ok(())
            }
        }

        let report = orchestrator
            .run_scenario(&FailTeardown(store.clone()))
            .await;

        assert!(report.passed());
        assert_eq!(report.teardown.failures.len(), 1);
        assert_eq!(report.teardown.deleted, 0);
    }

    #[tokio::test]
    async fn run_all_reports_store_calls_and_validator_stats() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());
        let scenarios: Vec<Box<dyn Scenario>> = vec![Box::new(BasicDependencyFlow)];

        let run = orchestrator.run_all(&scenarios).await;

        assert!(run.success(), "{}", run.format_summary());
        assert!(run.store_calls.unwrap().add_tool >= 1);
        assert!(run.validator.total_validations >= 1);
        assert!(orchestrator.validator().cache().is_empty());
    }
}
