//! In-process [`RemoteStore`] used for offline runs and tests.

use crate::error::GatewayError;
use crate::store::{GatewayResult, RemoteStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use toolgraph_model::{
    Envelope, McpServer, McpServerKey, Page, PageRequest, ServerId, ToolKey, ToolSpec,
};
use tracing::debug;

/// Largest page the store accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// How deleting a key that does not exist is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingDeletePolicy {
    /// `success: true`.
    #[default]
    Idempotent,
    /// `success: false` with a not-found message.
    Strict,
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStats {
    pub add_tool: u32,
    pub update_tool: u32,
    pub remove_tool: u32,
    pub tool_info: u32,
    pub list_tools: u32,
    pub add_server: u32,
    pub update_server: u32,
    pub remove_server: u32,
    pub server_info: u32,
    pub list_servers: u32,
}

impl CallStats {
    pub fn total(&self) -> u32 {
        self.add_tool
            + self.update_tool
            + self.remove_tool
            + self.tool_info
            + self.list_tools
            + self.add_server
            + self.update_server
            + self.remove_server
            + self.server_info
            + self.list_servers
    }
}

#[derive(Debug, Default)]
struct Inner {
    tools: BTreeMap<ToolKey, ToolSpec>,
    servers: BTreeMap<ServerId, McpServer>,
    next_id: u64,
    stats: CallStats,
    /// Number of upcoming calls that fail with a transport error.
    injected_failures: u32,
}

impl Inner {
    fn server_id_of(&self, key: &McpServerKey) -> Option<ServerId> {
        self.servers
            .iter()
            .find(|(_, s)| &s.key == key)
            .map(|(id, _)| *id)
    }

    fn referrers_of(&self, tool: &ToolKey) -> Vec<String> {
        self.servers
            .values()
            .filter(|s| s.references(tool))
            .map(|s| s.key.to_string())
            .collect()
    }
}

/// Remote store held in memory, honoring the same envelope contract as
/// the HTTP console: page validation, not-found answers, assigned ids.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    missing_delete: MissingDeletePolicy,
    reject_referenced_delete: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_missing_delete(mut self, policy: MissingDeletePolicy) -> Self {
        self.missing_delete = policy;
        self
    }

    /// Refuse to remove a tool that a stored server still references.
    #[must_use]
    pub fn rejecting_referenced_deletes(mut self) -> Self {
        self.reject_referenced_delete = true;
        self
    }

    /// Make the next `count` calls fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().injected_failures = count;
    }

    pub fn stats(&self) -> CallStats {
        self.inner.lock().stats
    }

    pub fn tool_count(&self) -> usize {
        self.inner.lock().tools.len()
    }

    pub fn server_count(&self) -> usize {
        self.inner.lock().servers.len()
    }

    /// Store a server as-is, bypassing validation. Returns its id.
    pub fn seed_server(&self, server: McpServer) -> ServerId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ServerId(inner.next_id);
        inner.servers.insert(id, server.with_id(id));
        id
    }

    /// Store a tool as-is, bypassing validation.
    pub fn seed_tool(&self, spec: ToolSpec) {
        self.inner.lock().tools.insert(spec.key.clone(), spec);
    }

    /// Count the call and consume one injected failure, if any.
    fn enter(&self, operation: &str, bump: impl FnOnce(&mut CallStats)) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();
        bump(&mut inner.stats);
        if inner.injected_failures > 0 {
            inner.injected_failures -= 1;
            return Err(GatewayError::transport(operation, "injected failure"));
        }
        Ok(())
    }

    fn missing_delete_answer(&self, what: String) -> Envelope<()> {
        match self.missing_delete {
            MissingDeletePolicy::Idempotent => Envelope::ok_empty(),
            MissingDeletePolicy::Strict => Envelope::fail(format!("{what} not found")),
        }
    }
}

fn check_page(page: PageRequest) -> Result<(), String> {
    if page.page_size() > MAX_PAGE_SIZE {
        return Err(format!("pageSize must not exceed {MAX_PAGE_SIZE}"));
    }
    Ok(())
}

fn slice<T>(items: impl Iterator<Item = T>, page: PageRequest) -> Page<T> {
    let all: Vec<T> = items.collect();
    let total = all.len();
    let list = all
        .into_iter()
        .skip(page.offset())
        .take(page.page_size() as usize)
        .collect();
    Page::new(total, list)
}

fn key_violation(key: &ToolKey) -> Option<String> {
    let missing = key.missing_parts();
    if missing.is_empty() {
        None
    } else {
        Some(format!("{} must not be empty", missing.join(", ")))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn add_tool(&self, spec: &ToolSpec) -> GatewayResult<()> {
        self.enter("toolspec/add", |s| s.add_tool += 1)?;
        if let Some(violation) = key_violation(&spec.key) {
            return Ok(Envelope::fail(violation));
        }
        let mut inner = self.inner.lock();
        let version = match inner.tools.get(&spec.key) {
            Some(existing) => spec.version.max(existing.version + 1),
            None => spec.version.max(1),
        };
        let mut stored = spec.clone();
        stored.version = version;
        inner.tools.insert(stored.key.clone(), stored);
        debug!(target: "toolgraph::gateway", tool = %spec.key, version, "memory store: tool added");
        Ok(Envelope::ok_empty())
    }

    async fn update_tool(&self, spec: &ToolSpec) -> GatewayResult<()> {
        self.enter("toolspec/update", |s| s.update_tool += 1)?;
        let mut inner = self.inner.lock();
        let Some(existing) = inner.tools.get(&spec.key) else {
            return Ok(Envelope::fail(format!("ToolSpec {} not found", spec.key)));
        };
        let version = spec.version.max(existing.version + 1);
        let mut stored = spec.clone();
        stored.version = version;
        inner.tools.insert(stored.key.clone(), stored);
        Ok(Envelope::ok_empty())
    }

    async fn remove_tool(&self, key: &ToolKey) -> GatewayResult<()> {
        self.enter("toolspec/remove", |s| s.remove_tool += 1)?;
        if let Some(violation) = key_violation(key) {
            return Ok(Envelope::fail(violation));
        }
        let mut inner = self.inner.lock();
        if !inner.tools.contains_key(key) {
            drop(inner);
            return Ok(self.missing_delete_answer(format!("ToolSpec {key}")));
        }
        if self.reject_referenced_delete {
            let referrers = inner.referrers_of(key);
            if !referrers.is_empty() {
                return Ok(Envelope::fail(format!(
                    "ToolSpec {key} is referenced by {}",
                    referrers.join(", ")
                )));
            }
        }
        inner.tools.remove(key);
        Ok(Envelope::ok_empty())
    }

    async fn tool_info(&self, key: &ToolKey) -> GatewayResult<ToolSpec> {
        self.enter("toolspec/info", |s| s.tool_info += 1)?;
        let inner = self.inner.lock();
        Ok(match inner.tools.get(key) {
            Some(spec) => Envelope::ok(spec.clone()),
            None => Envelope::fail(format!("ToolSpec {key} not found")),
        })
    }

    async fn list_tools(&self, page: PageRequest) -> GatewayResult<Page<ToolSpec>> {
        self.enter("toolspec/list", |s| s.list_tools += 1)?;
        if let Err(message) = check_page(page) {
            return Ok(Envelope::fail(message));
        }
        let inner = self.inner.lock();
        Ok(Envelope::ok(slice(inner.tools.values().cloned(), page)))
    }

    async fn add_server(&self, server: &McpServer) -> GatewayResult<ServerId> {
        self.enter("mcp/server/add", |s| s.add_server += 1)?;
        if server.key.namespace.is_empty() || server.key.name.is_empty() {
            return Ok(Envelope::fail("namespace and name must not be empty"));
        }
        let mut inner = self.inner.lock();
        if inner.server_id_of(&server.key).is_some() {
            return Ok(Envelope::fail(format!("McpServer {} already exists", server.key)));
        }
        inner.next_id += 1;
        let id = ServerId(inner.next_id);
        inner.servers.insert(id, server.clone().with_id(id));
        debug!(target: "toolgraph::gateway", server = %server.key, %id, "memory store: server added");
        Ok(Envelope::ok(id))
    }

    async fn update_server(&self, server: &McpServer) -> GatewayResult<()> {
        self.enter("mcp/server/update", |s| s.update_server += 1)?;
        let Some(id) = server.id else {
            return Ok(Envelope::fail("id is required"));
        };
        let mut inner = self.inner.lock();
        match inner.servers.get_mut(&id) {
            Some(stored) => {
                *stored = server.clone();
                Ok(Envelope::ok_empty())
            }
            None => Ok(Envelope::fail(format!("McpServer {id} not found"))),
        }
    }

    async fn remove_server(&self, id: ServerId) -> GatewayResult<()> {
        self.enter("mcp/server/remove", |s| s.remove_server += 1)?;
        if id.0 == 0 {
            return Ok(Envelope::fail("id must be positive"));
        }
        let removed = self.inner.lock().servers.remove(&id);
        Ok(match removed {
            Some(_) => Envelope::ok_empty(),
            None => self.missing_delete_answer(format!("McpServer {id}")),
        })
    }

    async fn server_info(&self, id: ServerId) -> GatewayResult<McpServer> {
        self.enter("mcp/server/info", |s| s.server_info += 1)?;
        let inner = self.inner.lock();
        Ok(match inner.servers.get(&id) {
            Some(server) => Envelope::ok(server.clone()),
            None => Envelope::fail(format!("McpServer {id} not found")),
        })
    }

    async fn list_servers(&self, page: PageRequest) -> GatewayResult<Page<McpServer>> {
        self.enter("mcp/server/list", |s| s.list_servers += 1)?;
        if let Err(message) = check_page(page) {
            return Ok(Envelope::fail(message));
        }
        let inner = self.inner.lock();
        Ok(Envelope::ok(slice(inner.servers.values().cloned(), page)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgraph_model::ToolReference;
    use toolgraph_test_utils::tool_spec as spec;

    #[tokio::test]
    async fn tool_round_trip_and_not_found() {
        let store = MemoryStore::new();
        assert!(store.add_tool(&spec("a")).await.unwrap().success);

        let found = store.tool_info(&spec("a").key).await.unwrap();
        assert_eq!(found.into_data().map(|s| s.version), Some(1));

        let missing = store.tool_info(&spec("b").key).await.unwrap();
        assert!(!missing.success);
        assert!(missing.message_or("").contains("not found"));
        assert_eq!(store.stats().tool_info, 2);
    }

    #[tokio::test]
    async fn update_never_lowers_version() {
        let store = MemoryStore::new();
        store.add_tool(&spec("a")).await.unwrap();
        store.update_tool(&spec("a")).await.unwrap();

        let stored = store.tool_info(&spec("a").key).await.unwrap().into_data();
        assert_eq!(stored.map(|s| s.version), Some(2));
    }

    #[tokio::test]
    async fn missing_delete_follows_policy_consistently() {
        let idempotent = MemoryStore::new();
        let strict = MemoryStore::new().with_missing_delete(MissingDeletePolicy::Strict);
        let key = ToolKey::new("n1", "g1", "ghost");

        for _ in 0..2 {
            assert!(idempotent.remove_tool(&key).await.unwrap().success);
            assert!(!strict.remove_tool(&key).await.unwrap().success);
            assert!(idempotent.remove_server(ServerId(99)).await.unwrap().success);
            assert!(!strict.remove_server(ServerId(99)).await.unwrap().success);
        }
    }

    #[tokio::test]
    async fn servers_get_sequential_ids_and_unique_keys() {
        let store = MemoryStore::new();
        let server = McpServer::new(McpServerKey::new("n1", "s1"))
            .with_tools(vec![ToolReference::new(spec("a").key)]);

        let first = store.add_server(&server).await.unwrap();
        assert_eq!(first.into_data(), Some(ServerId(1)));

        let duplicate = store.add_server(&server).await.unwrap();
        assert!(!duplicate.success);

        let info = store.server_info(ServerId(1)).await.unwrap().into_data().unwrap();
        assert_eq!(info.id, Some(ServerId(1)));
        assert_eq!(info.tools.len(), 1);
    }

    #[tokio::test]
    async fn oversized_page_is_rejected() {
        let store = MemoryStore::new();
        let page = PageRequest::new(1, MAX_PAGE_SIZE + 1).unwrap();
        assert!(!store.list_tools(page).await.unwrap().success);
        assert!(!store.list_servers(page).await.unwrap().success);
    }

    #[tokio::test]
    async fn list_pages_are_sliced() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store.add_tool(&spec(name)).await.unwrap();
        }
        let page = store
            .list_tools(PageRequest::new(2, 2).unwrap())
            .await
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.list.len(), 1);
        assert_eq!(page.list[0].key.tool_name, "c");
    }

    #[tokio::test]
    async fn referenced_delete_can_be_refused() {
        let store = MemoryStore::new().rejecting_referenced_deletes();
        store.add_tool(&spec("a")).await.unwrap();
        store.seed_server(
            McpServer::new(McpServerKey::new("n1", "s1"))
                .with_tools(vec![ToolReference::new(spec("a").key)]),
        );

        let answer = store.remove_tool(&spec("a").key).await.unwrap();
        assert!(!answer.success);
        assert!(answer.message_or("").contains("n1/s1"));
        assert_eq!(store.tool_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_transport_errors() {
        let store = MemoryStore::new();
        store.fail_next(1);

        let err = store.list_tools(PageRequest::first(10)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.list_tools(PageRequest::first(10)).await.is_ok());
        assert_eq!(store.stats().list_tools, 2);
    }
}
