//! Per-scenario state and the tracked write operations scenarios use.

use crate::fixtures::FixtureFactory;
use crate::report::CheckRecord;
use std::sync::Arc;
use std::time::Duration;
use toolgraph_gateway::{all_servers, GatewayError, RemoteStore};
use toolgraph_graph::{EdgeDiff, TeardownStep, Tracker};
use toolgraph_model::{
    CheckError, ErrorKind, McpServer, McpServerKey, ServerId, ToolKey, ToolReference, ToolSpec,
};
use toolgraph_validate::{Validator, LIST_PAGE_SIZE};
use tracing::{debug, info};

/// Why a scenario step did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StepError {
    #[error(transparent)]
    Check(#[from] CheckError),

    /// The remote store answered `success=false` to a write.
    #[error("{operation} rejected by remote store: {message}")]
    Rejected { operation: String, message: String },

    #[error("scenario deadline of {after:?} exceeded")]
    DeadlineExceeded { after: Duration },

    /// The scenario asked for something that is not tracked.
    #[error("{0} is not tracked by this run")]
    Untracked(String),
}

impl StepError {
    /// Errors that end the scenario's remaining phases.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Check(err) => err.kind().is_fatal_to_scenario(),
            Self::DeadlineExceeded { .. } => true,
            Self::Rejected { .. } | Self::Untracked(_) => false,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Check(err) => Some(err.kind()),
            _ => None,
        }
    }

    fn rejected(operation: &str, message: String) -> Self {
        Self::Rejected {
            operation: operation.to_string(),
            message,
        }
    }
}

impl From<GatewayError> for StepError {
    fn from(err: GatewayError) -> Self {
        Self::Check(err.into_check_error())
    }
}

pub type StepResult<T = ()> = Result<T, StepError>;

/// Everything one scenario run owns: the registry/graph of what it
/// created, the fixtures it names things with, and the checks it recorded
/// in the current phase.
///
/// Writes are tracked before they are sent. An explicit rejection untracks
/// the entity again; a transport failure leaves it tracked so teardown
/// still attempts the delete.
pub struct ScenarioContext {
    store: Arc<dyn RemoteStore>,
    validator: Arc<Validator>,
    tracker: Tracker,
    fixtures: FixtureFactory,
    checks: Vec<CheckRecord>,
}

impl ScenarioContext {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        validator: Arc<Validator>,
        fixtures: FixtureFactory,
    ) -> Self {
        Self {
            store,
            validator,
            tracker: Tracker::new(),
            fixtures,
            checks: Vec::new(),
        }
    }

    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn fixtures(&self) -> &FixtureFactory {
        &self.fixtures
    }

    // ===== Check recording =====

    /// Record `result` under `name`.
    ///
    /// A fatal error is recorded and then returned so the caller can stop
    /// with `?`. Any other error is recorded and yields `Ok(None)`.
    pub fn check<T>(
        &mut self,
        name: impl Into<String>,
        result: Result<T, CheckError>,
    ) -> Result<Option<T>, StepError> {
        let name = name.into();
        match result {
            Ok(value) => {
                self.checks.push(CheckRecord::pass(name, "ok"));
                Ok(Some(value))
            }
            Err(err) => {
                self.checks
                    .push(CheckRecord::fail(name, Some(err.kind()), err.to_string()));
                if err.kind().is_fatal_to_scenario() {
                    Err(err.into())
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Record a check that passes only when `result` failed with `kind`.
    pub fn expect_failure<T>(
        &mut self,
        name: impl Into<String>,
        result: Result<T, StepError>,
        kind: ErrorKind,
    ) -> StepResult {
        let name = name.into();
        match result {
            Err(err) if err.kind() == Some(kind) => {
                self.checks.push(CheckRecord::pass(name, err.to_string()));
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                self.checks
                    .push(CheckRecord::fail(name, err.kind(), err.to_string()));
                Err(err)
            }
            Err(err) => {
                self.checks.push(CheckRecord::fail(
                    name,
                    err.kind(),
                    format!("expected {kind}, got: {err}"),
                ));
                Ok(())
            }
            Ok(_) => {
                self.checks.push(CheckRecord::fail(
                    name,
                    None,
                    format!("expected {kind}, but the step succeeded"),
                ));
                Ok(())
            }
        }
    }

    /// Record a plain assertion.
    pub fn ensure(&mut self, name: impl Into<String>, condition: bool, detail: impl Into<String>) {
        let name = name.into();
        let detail = detail.into();
        self.checks.push(if condition {
            CheckRecord::pass(name, detail)
        } else {
            CheckRecord::fail(name, None, detail)
        });
    }

    pub fn record(&mut self, record: CheckRecord) {
        self.checks.push(record);
    }

    /// Checks recorded since the last call.
    pub fn take_checks(&mut self) -> Vec<CheckRecord> {
        std::mem::take(&mut self.checks)
    }

    // ===== Tools =====

    /// Create the fixture tool `name`.
    pub async fn create_tool(&mut self, name: &str) -> StepResult<ToolSpec> {
        let spec = self.fixtures.tool_spec(name);
        self.create_tool_spec(spec).await
    }

    pub async fn create_tool_spec(&mut self, spec: ToolSpec) -> StepResult<ToolSpec> {
        let previous = self.tracker.tool(&spec.key);
        self.tracker.track_tool(spec.clone());
        let envelope = self.store.add_tool(&spec).await?;
        if !envelope.success {
            match previous {
                Some(previous) => self.tracker.track_tool(previous),
                None => {
                    self.tracker.untrack_tool(&spec.key);
                }
            }
            return Err(StepError::rejected(
                "toolspec/add",
                envelope.message_or("no message"),
            ));
        }
        self.validator.forget(&spec.key);
        info!(target: "toolgraph::scenario", tool = %spec.key, "tool created");
        Ok(spec)
    }

    /// Send the next version of a tracked tool; returns the new version.
    pub async fn update_tool(&mut self, key: &ToolKey) -> StepResult<u64> {
        let mut spec = self
            .tracker
            .tool(key)
            .ok_or_else(|| StepError::Untracked(format!("tool {key}")))?;
        let version = spec.bump_version();
        let envelope = self.store.update_tool(&spec).await?;
        if !envelope.success {
            return Err(StepError::rejected(
                "toolspec/update",
                envelope.message_or("no message"),
            ));
        }
        self.tracker.track_tool(spec);
        debug!(target: "toolgraph::scenario", tool = %key, version, "tool updated");
        Ok(version)
    }

    /// Remove a tracked tool.
    ///
    /// A tool that tracked servers still reference is never sent to the
    /// remote store; the attempt fails with
    /// [`CheckError::DependencyNotFound`] naming the referrers.
    pub async fn delete_tool(&mut self, key: &ToolKey) -> StepResult {
        let referrers = self.tracker.referrers_of(key);
        if !referrers.is_empty() {
            let names: Vec<String> = referrers.iter().map(ToString::to_string).collect();
            return Err(CheckError::dependency_not_found(
                key.clone(),
                format!(
                    "deletion would leave dangling references from {}",
                    names.join(", ")
                ),
            )
            .into());
        }
        let envelope = self.store.remove_tool(key).await?;
        if !envelope.success {
            return Err(StepError::rejected(
                "toolspec/remove",
                envelope.message_or("no message"),
            ));
        }
        self.tracker.untrack_tool(key);
        self.validator.forget(key);
        info!(target: "toolgraph::scenario", tool = %key, "tool deleted");
        Ok(())
    }

    // ===== Servers =====

    /// Create the fixture server `name` referencing the named fixture tools.
    pub async fn create_server(&mut self, name: &str, tools: &[&str]) -> StepResult<McpServer> {
        let server = self.fixtures.server(name, tools);
        self.create_server_spec(server).await
    }

    /// Persist `server` and record the id the remote store assigns.
    pub async fn create_server_spec(&mut self, server: McpServer) -> StepResult<McpServer> {
        let previous = self.tracker.server(&server.key);
        let diff = self.tracker.track_server(server.clone());
        debug!(
            target: "toolgraph::scenario",
            server = %server.key,
            added = diff.added.len(),
            "server edges recorded"
        );
        let envelope = self.store.add_server(&server).await?;
        let id = match (envelope.success, envelope.data) {
            (true, Some(id)) => id,
            (true, None) => {
                return Err(StepError::rejected(
                    "mcp/server/add",
                    "no server id in response".to_string(),
                ))
            }
            (false, _) => {
                match previous {
                    Some(previous) => {
                        self.tracker.track_server(previous);
                    }
                    None => {
                        self.tracker.untrack_server(&server.key);
                    }
                }
                return Err(StepError::rejected(
                    "mcp/server/add",
                    envelope.message.unwrap_or_else(|| "no message".to_string()),
                ));
            }
        };
        self.tracker.assign_server_id(&server.key, id);
        info!(target: "toolgraph::scenario", server = %server.key, %id, "server created");
        Ok(server.with_id(id))
    }

    /// Replace the tool list of a tracked server.
    ///
    /// The remote copy is read first; if its tool set no longer matches
    /// what this run recorded, the write is refused with
    /// [`CheckError::ConcurrentMutation`].
    pub async fn update_server_tools(
        &mut self,
        key: &McpServerKey,
        tools: Vec<ToolReference>,
    ) -> StepResult<EdgeDiff> {
        let tracked = self
            .tracker
            .server(key)
            .ok_or_else(|| StepError::Untracked(format!("server {key}")))?;
        let id = self.resolve_server_id(key).await?.ok_or_else(|| {
            StepError::rejected("mcp/server/update", format!("server {key} has no remote id"))
        })?;

        let remote = self.store.server_info(id).await?;
        let Some(remote) = remote.data.filter(|_| remote.success) else {
            return Err(CheckError::ConcurrentMutation {
                entity: format!("server {key}"),
                detail: "server disappeared before update".to_string(),
            }
            .into());
        };
        if remote.tool_keys() != tracked.tool_keys() {
            return Err(CheckError::ConcurrentMutation {
                entity: format!("server {key}"),
                detail: format!(
                    "remote tool list changed: expected {}, found {}",
                    join(tracked.tool_keys().iter()),
                    join(remote.tool_keys().iter())
                ),
            }
            .into());
        }

        let updated = tracked.with_id(id).with_tools(tools);
        let envelope = self.store.update_server(&updated).await?;
        if !envelope.success {
            return Err(StepError::rejected(
                "mcp/server/update",
                envelope.message_or("no message"),
            ));
        }
        let diff = self.tracker.track_server(updated);
        info!(
            target: "toolgraph::scenario",
            server = %key,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "server tools updated"
        );
        Ok(diff)
    }

    /// Remove a tracked server.
    pub async fn delete_server(&mut self, key: &McpServerKey) -> StepResult {
        if self.tracker.server(key).is_none() {
            return Err(StepError::Untracked(format!("server {key}")));
        }
        if let Some(id) = self.resolve_server_id(key).await? {
            let envelope = self.store.remove_server(id).await?;
            if !envelope.success {
                return Err(StepError::rejected(
                    "mcp/server/remove",
                    envelope.message_or("no message"),
                ));
            }
        }
        self.tracker.untrack_server(key);
        info!(target: "toolgraph::scenario", server = %key, "server deleted");
        Ok(())
    }

    /// Tracked id of `key`, else the id found by listing remote servers.
    pub async fn resolve_server_id(&self, key: &McpServerKey) -> StepResult<Option<ServerId>> {
        if let Some(id) = self.tracker.server(key).and_then(|s| s.id) {
            return Ok(Some(id));
        }
        let servers = all_servers(self.store.as_ref(), LIST_PAGE_SIZE)
            .await
            .map_err(|e| match e {
                toolgraph_gateway::ListError::Gateway(g) => StepError::from(g),
                toolgraph_gateway::ListError::Rejected(message) => {
                    StepError::rejected("mcp/server/list", message)
                }
            })?;
        Ok(servers.into_iter().find(|s| &s.key == key).and_then(|s| s.id))
    }

    // ===== Teardown =====

    /// Carry out one teardown step.
    ///
    /// A delete the remote store rejects still counts as done when a
    /// follow-up read shows the entity is gone, so that idempotent and
    /// strict not-found answers have the same effect.
    pub async fn execute_teardown_step(&mut self, step: &TeardownStep) -> StepResult {
        match step {
            TeardownStep::DeleteServer(key) => {
                let Some(id) = self.resolve_server_id(key).await? else {
                    self.tracker.untrack_server(key);
                    return Ok(());
                };
                let envelope = self.store.remove_server(id).await?;
                if !envelope.success {
                    let info = self.store.server_info(id).await?;
                    if info.success {
                        return Err(StepError::rejected(
                            "mcp/server/remove",
                            envelope.message_or("no message"),
                        ));
                    }
                }
                self.tracker.untrack_server(key);
                Ok(())
            }
            TeardownStep::DeleteTool(key) => {
                let envelope = self.store.remove_tool(key).await?;
                if !envelope.success {
                    let info = self.store.tool_info(key).await?;
                    if info.success {
                        return Err(StepError::rejected(
                            "toolspec/remove",
                            envelope.message_or("no message"),
                        ));
                    }
                }
                self.tracker.untrack_tool(key);
                Ok(())
            }
        }
    }

    /// Forget everything this scenario tracked.
    pub fn reset(&mut self) {
        self.tracker.clear();
        self.validator.clear_cache();
        self.checks.clear();
    }
}

fn join<'a>(keys: impl Iterator<Item = &'a ToolKey>) -> String {
    let parts: Vec<String> = keys.map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
