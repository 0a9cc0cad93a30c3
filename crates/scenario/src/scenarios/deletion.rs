use super::{expect_consistent, expect_count, expect_exists, require, Scenario};
use crate::context::{ScenarioContext, StepResult};
use async_trait::async_trait;
use toolgraph_model::ErrorKind;

const TOOL: &str = "deletion-test-tool";
const SERVER: &str = "deletion-test-server";
const TOOL_2: &str = "deletion-test-tool-2";
const SERVER_2: &str = "deletion-test-server-2";

/// A referenced tool cannot be deleted; once its server is gone it can.
pub struct ReferencedToolDeletion;

#[async_trait]
impl Scenario for ReferencedToolDeletion {
    fn name(&self) -> &'static str {
        "referenced-tool-deletion"
    }

    fn description(&self) -> &'static str {
        "deleting a referenced tool is refused; deleting it after its server succeeds"
    }

    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
        for (tool, server) in [(TOOL, SERVER), (TOOL_2, SERVER_2)] {
            let result = ctx.create_tool(tool).await;
            require(ctx, format!("create tool {tool}"), result)?;
            let result = ctx.create_server(server, &[tool]).await;
            require(ctx, format!("create server {server}"), result)?;
        }
        Ok(())
    }

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_count(ctx, TOOL, 1).await?;
        expect_count(ctx, TOOL_2, 1).await
    }

    async fn mutate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let key = ctx.fixtures().tool_key(TOOL);
        let result = ctx.delete_tool(&key).await;
        ctx.expect_failure(
            format!("deleting referenced {TOOL} is refused"),
            result,
            ErrorKind::DependencyNotFound,
        )?;

        let server = ctx.fixtures().server_key(SERVER_2);
        let result = ctx.delete_server(&server).await;
        require(ctx, format!("delete server {SERVER_2}"), result)?;
        let key = ctx.fixtures().tool_key(TOOL_2);
        let result = ctx.delete_tool(&key).await;
        require(ctx, format!("delete unreferenced {TOOL_2}"), result)
    }

    async fn revalidate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_exists(ctx, TOOL).await?;
        expect_count(ctx, TOOL, 1).await?;

        let key = ctx.fixtures().tool_key(TOOL_2);
        let result = ctx.validator().check_exists(&key).await;
        if let Some(existence) = ctx.check(format!("look up {TOOL_2}"), result)? {
            ctx.ensure(
                format!("{TOOL_2} is gone"),
                !existence.exists,
                existence.detail,
            );
        }
        expect_count(ctx, TOOL_2, 0).await?;
        expect_consistent(ctx).await
    }
}
