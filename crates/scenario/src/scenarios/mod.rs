//! Built-in scenarios and the checks they share.

mod cache;
mod counting;
mod deletion;
mod flow;
mod missing;

use crate::context::{ScenarioContext, StepResult};
use crate::report::CheckRecord;
use async_trait::async_trait;

pub use cache::ValidationCacheScenario;
pub use counting::{MultipleReferences, ReferenceCounting};
pub use deletion::ReferencedToolDeletion;
pub use flow::BasicDependencyFlow;
pub use missing::MissingDependency;

/// A named sequence of phases driven by the orchestrator.
///
/// Phases record checks on the context; returning an error fails the
/// phase, and a fatal error skips the phases after it. Teardown is not
/// part of a scenario: the orchestrator unwinds whatever the context
/// tracked.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Create tools, then the servers that reference them.
    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult;

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult;

    async fn mutate(&self, _ctx: &mut ScenarioContext) -> StepResult {
        Ok(())
    }

    async fn revalidate(&self, _ctx: &mut ScenarioContext) -> StepResult {
        Ok(())
    }
}

/// Every built-in scenario, in run order.
pub fn builtin() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(BasicDependencyFlow),
        Box::new(ReferenceCounting),
        Box::new(MultipleReferences),
        Box::new(MissingDependency),
        Box::new(ReferencedToolDeletion),
        Box::new(ValidationCacheScenario),
    ]
}

pub fn find(name: &str) -> Option<Box<dyn Scenario>> {
    builtin().into_iter().find(|s| s.name() == name)
}

// ===== Shared checks =====

/// Reference count of fixture tool `tool` from the tracked graph.
pub(crate) async fn expect_count(
    ctx: &mut ScenarioContext,
    tool: &str,
    expected: usize,
) -> StepResult {
    let key = ctx.fixtures().tool_key(tool);
    let result = ctx
        .validator()
        .check_reference_count(&key, expected, Some(ctx.tracker()))
        .await;
    ctx.check(format!("reference count of {tool} is {expected}"), result)?;
    Ok(())
}

/// Reference count of fixture tool `tool` recomputed from the remote
/// server list.
pub(crate) async fn expect_remote_count(
    ctx: &mut ScenarioContext,
    tool: &str,
    expected: usize,
) -> StepResult {
    let key = ctx.fixtures().tool_key(tool);
    let result = ctx
        .validator()
        .check_reference_count(&key, expected, None)
        .await;
    ctx.check(
        format!("remote reference count of {tool} is {expected}"),
        result,
    )?;
    Ok(())
}

pub(crate) async fn expect_exists(ctx: &mut ScenarioContext, tool: &str) -> StepResult {
    let key = ctx.fixtures().tool_key(tool);
    let result = ctx.validator().require_exists(&key).await;
    ctx.check(format!("{tool} exists"), result)?;
    Ok(())
}

/// Every tracked server's references resolve, locally and remotely.
pub(crate) async fn expect_consistent(ctx: &mut ScenarioContext) -> StepResult {
    let result = ctx
        .validator()
        .check_consistency(None, Some(ctx.tracker()))
        .await
        .and_then(|report| report.into_result());
    ctx.check("tracked servers are consistent", result)?;
    let violations = ctx.tracker().validate_local();
    ctx.ensure(
        "local graph is consistent",
        violations.is_empty(),
        if violations.is_empty() {
            "ok".to_string()
        } else {
            violations.join("; ")
        },
    );
    Ok(())
}

/// The remote tool list of fixture server `server` matches the tracked one.
pub(crate) async fn expect_server_tools(ctx: &mut ScenarioContext, server: &str) -> StepResult {
    let key = ctx.fixtures().server_key(server);
    let name = format!("remote tool list of {server} matches");
    let Some(tracked) = ctx.tracker().server(&key) else {
        ctx.ensure(name, false, "server is not tracked");
        return Ok(());
    };
    let Some(id) = tracked.id else {
        ctx.ensure(name, false, "server has no remote id");
        return Ok(());
    };
    let result = ctx
        .validator()
        .validate_server_tools(id, &tracked.tools)
        .await;
    ctx.check(name, result)?;
    Ok(())
}

/// Record a write step that must succeed; a failure fails the phase.
pub(crate) fn require<T>(
    ctx: &mut ScenarioContext,
    name: impl Into<String>,
    result: StepResult<T>,
) -> StepResult<T> {
    let name = name.into();
    match result {
        Ok(value) => {
            ctx.ensure(name, true, "ok");
            Ok(value)
        }
        Err(err) => {
            ctx.record(CheckRecord::fail(
                name,
                err.kind(),
                err.to_string(),
            ));
            Err(err)
        }
    }
}
