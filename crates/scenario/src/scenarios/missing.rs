use super::{expect_exists, require, Scenario};
use crate::context::{ScenarioContext, StepError, StepResult};
use async_trait::async_trait;
use toolgraph_model::{ErrorKind, ToolKey, ToolReference};

const PRESENT: &str = "present-tool";
const MISSING: &str = "missing-tool";
const SERVER: &str = "missing-dependency-server";

/// A server whose tool list names a tool that was never created.
pub struct MissingDependency;

#[async_trait]
impl Scenario for MissingDependency {
    fn name(&self) -> &'static str {
        "missing-dependency"
    }

    fn description(&self) -> &'static str {
        "malformed and dangling references are reported with their kind"
    }

    async fn populate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let result = ctx.create_tool(PRESENT).await;
        require(ctx, format!("create tool {PRESENT}"), result)?;
        Ok(())
    }

    async fn validate(&self, ctx: &mut ScenarioContext) -> StepResult {
        expect_exists(ctx, PRESENT).await?;

        let missing = ctx.fixtures().tool_key(MISSING);
        let result = ctx.validator().require_exists(&missing).await;
        ctx.expect_failure(
            format!("{MISSING} is reported missing"),
            result.map_err(StepError::from),
            ErrorKind::DependencyNotFound,
        )?;

        let malformed = ToolReference::pinned(
            ToolKey::new(ctx.fixtures().namespace(), ctx.fixtures().group(), ""),
            0,
        );
        let result = ctx.validator().check_format(&malformed);
        ctx.expect_failure(
            "reference with empty name and zero pin is malformed",
            result.map_err(StepError::from),
            ErrorKind::Format,
        )?;
        Ok(())
    }

    async fn mutate(&self, ctx: &mut ScenarioContext) -> StepResult {
        // the remote store may refuse the dangling reference or accept it;
        // either way the dependency must not go unnoticed
        match ctx.create_server(SERVER, &[PRESENT, MISSING]).await {
            Ok(server) => ctx.ensure(
                "server with dangling reference stored",
                true,
                format!("accepted with id {:?}", server.id),
            ),
            Err(StepError::Rejected { message, .. }) => ctx.ensure(
                "server with dangling reference refused",
                true,
                message,
            ),
            Err(err) => {
                require(ctx, format!("create server {SERVER}"), Err::<(), _>(err))?;
            }
        }
        Ok(())
    }

    async fn revalidate(&self, ctx: &mut ScenarioContext) -> StepResult {
        let key = ctx.fixtures().server_key(SERVER);
        let Some(server) = ctx.tracker().server(&key) else {
            return Ok(());
        };
        let result = ctx
            .validator()
            .check_consistency(Some(&server), Some(ctx.tracker()))
            .await;
        let Some(report) = ctx.check("consistency check completes", result)? else {
            return Ok(());
        };
        let missing = ctx.fixtures().tool_key(MISSING);
        let flagged = report
            .issues
            .iter()
            .filter(|i| i.kind == ErrorKind::DependencyNotFound)
            .all(|i| i.message.contains(&missing.to_string()));
        ctx.ensure(
            "only the dangling reference is flagged",
            report.error_count() == 1 && flagged,
            report
                .issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        );
        Ok(())
    }
}
