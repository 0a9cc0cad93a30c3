use super::{
    expect_consistent, expect_count, expect_remote_count, expect_server_tools, require, Scenario,
};
use crate::context::{ScenarioContext, StepResult};
use async_trait::async_trait;
use toolgraph_graph::TeardownStep;
use toolgraph_model::ToolReference;

/// Two servers sharing one tool; removing one server drops one reference.
pub struct ReferenceCounting;

#[async_trait]
impl Scenario for ReferenceCounting {
    fn name(&self) -> &'static str {
        "reference-counting"
    }

    fn description(&self) -> &'static str {
        "reference counts follow server creation and deletion, locally and remotely"
    }

    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let result = ctx.create_tool("tool1").await;
        require(ctx, "create tool tool1", result)?;
        let result = ctx.create_server("s1", &["tool1"]).await;
        require(ctx, "create server s1", result)?;
        expect_count(ctx, "tool1", 1).await?;

        let result = ctx.create_tool("tool2").await;
        require(ctx, "create tool tool2", result)?;
        let result = ctx.create_server("s2", &["tool1", "tool2"]).await;
        require(ctx, "create server s2", result)?;
        Ok(())
    }

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_count(ctx, "tool1", 2).await?;
        expect_count(ctx, "tool2", 1).await?;
        expect_remote_count(ctx, "tool1", 2).await?;
        expect_remote_count(ctx, "tool2", 1).await?;

        let plan = ctx.tracker().plan_teardown();
        let violations = plan.verify(&ctx.tracker().snapshot());
        let servers_first = plan
            .iter()
            .position(|s| matches!(s, TeardownStep::DeleteTool(_)))
            .map_or(true, |first_tool| {
                plan.iter()
                    .skip(first_tool)
                    .all(|s| matches!(s, TeardownStep::DeleteTool(_)))
            });
        ctx.ensure(
            "teardown plan retires servers before tools",
            violations.is_empty() && servers_first,
            plan.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "),
        );
        expect_consistent(ctx).await
    }

    async fn mutate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let key = ctx.fixtures().server_key("s1");
        let result = ctx.delete_server(&key).await;
        require(ctx, "delete server s1", result)
    }

    async fn revalidate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_count(ctx, "tool1", 1).await?;
        expect_count(ctx, "tool2", 1).await?;
        expect_remote_count(ctx, "tool1", 1).await?;
        expect_consistent(ctx).await
    }
}

const MULTI: [&str; 3] = ["multi-tool-1", "multi-tool-2", "multi-tool-3"];

/// One server referencing several tools, a second referencing a subset,
/// then a tool-list rewrite.
pub struct MultipleReferences;

#[async_trait]
impl Scenario for MultipleReferences {
    fn name(&self) -> &'static str {
        "multiple-references"
    }

    fn description(&self) -> &'static str {
        "a server referencing several tools, partial overlap, and a tool-list update"
    }

    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
        for tool in MULTI {
            let result = ctx.create_tool(tool).await;
            require(ctx, format!("create tool {tool}"), result)?;
        }
        let result = ctx.create_server("multi-reference-server", &MULTI).await;
        require(ctx, "create server multi-reference-server", result)?;
        Ok(())
    }

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_server_tools(ctx, "multi-reference-server").await?;
        for tool in MULTI {
            expect_count(ctx, tool, 1).await?;
        }
        let key = ctx.fixtures().server_key("multi-reference-server");
        let edges = ctx.tracker().snapshot().forward.get(&key).map_or(0, |e| e.len());
        ctx.ensure(
            "server has one edge per tool",
            edges == MULTI.len(),
            format!("{edges} edge(s)"),
        );
        expect_consistent(ctx).await
    }

    async fn mutate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let result = ctx
            .create_server("partial-reference-server", &[MULTI[0], MULTI[2]])
            .await;
        require(ctx, "create server partial-reference-server", result)?;

        // drop the third tool from the first server
        let key = ctx.fixtures().server_key("multi-reference-server");
        let refs: Vec<ToolReference> = MULTI[..2]
            .iter()
            .map(|t| ToolReference::pinned(ctx.fixtures().tool_key(t), 1))
            .collect();
        let result = ctx.update_server_tools(&key, refs).await;
        let diff = require(ctx, "update tools of multi-reference-server", result)?;
        ctx.ensure(
            "update removed exactly one edge",
            diff.added.is_empty() && diff.removed.len() == 1,
            format!("added {}, removed {}", diff.added.len(), diff.removed.len()),
        );
        Ok(())
    }

    async fn revalidate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_server_tools(ctx, "multi-reference-server").await?;
        expect_server_tools(ctx, "partial-reference-server").await?;
        for (tool, expected) in MULTI.into_iter().zip([2, 1, 1]) {
            expect_count(ctx, tool, expected).await?;
        }
        expect_remote_count(ctx, MULTI[2], 1).await?;
        expect_consistent(ctx).await
    }
}
