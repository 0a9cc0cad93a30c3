use super::{require, Scenario};
use crate::context::{ScenarioContext, StepResult};
use async_trait::async_trait;

const TOOL: &str = "cache-tool";
const ABSENT: &str = "absent-tool";

/// Repeated lookups inside the freshness window are served from cache.
pub struct ValidationCacheScenario;

impl ValidationCacheScenario {
    /// Look `tool` up twice and check that only the first went remote.
    async fn lookup_twice(ctx: &mut ScenarioContext, tool: &str, expect_exists: bool) -> StepResult {
        let key = ctx.fixtures().tool_key(tool);
        let before = ctx.validator().statistics().remote_lookups;
        let first = ctx.validator().check_exists(&key).await;
        let Some(first) = ctx.check(format!("first lookup of {tool}"), first)? else {
            return Ok(());
        };
        let second = ctx.validator().check_exists(&key).await;
        let Some(second) = ctx.check(format!("second lookup of {tool}"), second)? else {
            return Ok(());
        };
        let lookups = ctx.validator().statistics().remote_lookups - before;

        ctx.ensure(
            format!("{tool} existence is {expect_exists} both times"),
            first.exists == expect_exists && second.exists == expect_exists,
            format!("first: {}, second: {}", first.detail, second.detail),
        );
        ctx.ensure(
            format!("{tool} looked up remotely once"),
            !first.cached && second.cached && lookups == 1,
            format!("{lookups} remote lookup(s)"),
        );
        Ok(())
    }
}

#[async_trait]
impl Scenario for ValidationCacheScenario {
    fn name(&self) -> &'static str {
        "validation-cache"
    }

    fn description(&self) -> &'static str {
        "existence outcomes, found or not, are cached and cleared on demand"
    }

    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let result = ctx.create_tool(TOOL).await;
        require(ctx, format!("create tool {TOOL}"), result)?;
        Ok(())
    }

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
        Self::lookup_twice(ctx, TOOL, true).await?;
        Self::lookup_twice(ctx, ABSENT, false).await
    }

    async fn mutate(&self, ctx: &mut ScenarioContext) -> StepResult {
        ctx.validator().clear_cache();
        let size = ctx.validator().cache().len();
        ctx.ensure("cache is empty after clear", size == 0, format!("{size} entries"));
        Ok(())
    }

    async fn revalidate(&self, ctx: &mut ScenarioContext) -> StepResult {
        Self::lookup_twice(ctx, ABSENT, false).await
    }
}
