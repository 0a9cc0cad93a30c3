use super::{expect_consistent, expect_count, expect_exists, expect_server_tools, require, Scenario};
use crate::context::{ScenarioContext, StepResult};
use async_trait::async_trait;
use toolgraph_gateway::RemoteStore;

const TOOL: &str = "basic-flow-tool";
const SERVER: &str = "basic-flow-server";

/// Tool first, then a server referencing it; then a version bump.
pub struct BasicDependencyFlow;

#[async_trait]
impl Scenario for BasicDependencyFlow {
    fn name(&self) -> &'static str {
        "basic-dependency-flow"
    }

    fn description(&self) -> &'static str {
        "create a tool, then a server referencing it, and check the edge end to end"
    }

    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let result = ctx.create_tool(TOOL).await;
        require(ctx, format!("create tool {TOOL}"), result)?;
        let result = ctx.create_server(SERVER, &[TOOL]).await;
        require(ctx, format!("create server {SERVER}"), result)?;
        Ok(())
    }

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_exists(ctx, TOOL).await?;
        expect_server_tools(ctx, SERVER).await?;
        expect_count(ctx, TOOL, 1).await?;
        expect_consistent(ctx).await
    }

    async fn mutate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let key = ctx.fixtures().tool_key(TOOL);
        let result = ctx.update_tool(&key).await;
        let version = require(ctx, format!("update tool {TOOL}"), result)?;
        ctx.ensure(
            "tool version increased",
            version == 2,
            format!("version is now {version}"),
        );
        Ok(())
    }

    async fn revalidate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let key = ctx.fixtures().tool_key(TOOL);
        let envelope = ctx.store().tool_info(&key).await?;
        let remote_version = envelope.data.filter(|_| envelope.success).map(|s| s.version);
        ctx.ensure(
            "remote tool carries the new version",
            remote_version == Some(2),
            format!("remote version {remote_version:?}"),
        );
        // an update of the tool never touches the edges
        expect_count(ctx, TOOL, 1).await?;
        expect_consistent(ctx).await
    }
}
