//! Registry and dependency graph kept in step behind one handle.

use crate::deps::{DependencyGraph, EdgeDiff, GraphSnapshot};
use crate::registry::{CreationEntry, EntityRegistry};
use crate::teardown::{plan_deletions, TeardownPlan};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use toolgraph_model::{McpServer, McpServerKey, ServerId, ToolKey, ToolSpec};
use tracing::debug;

/// Counters describing what is currently tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub tool_count: usize,
    pub server_count: usize,
    pub edge_count: usize,
    pub creation_log_len: usize,
    /// Forward graph as `server -> [tool]` display strings.
    pub forward: BTreeMap<String, Vec<String>>,
}

/// Owns the run's [`EntityRegistry`] and [`DependencyGraph`].
///
/// Every server write goes through here so that edges are always derived
/// from the tool list that was stored. The registry lock is taken before
/// the graph lock, never the other way around.
#[derive(Debug, Default)]
pub struct Tracker {
    registry: RwLock<EntityRegistry>,
    graph: DependencyGraph,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Writes =====

    pub fn track_tool(&self, spec: ToolSpec) {
        debug!(target: "toolgraph::graph", tool = %spec.key, version = spec.version, "tracking tool");
        self.registry.write().put_tool(spec);
    }

    /// Store `server` and replace its edges with its current tool list.
    pub fn track_server(&self, server: McpServer) -> EdgeDiff {
        let key = server.key.clone();
        let tools = server.tool_keys();
        let mut registry = self.registry.write();
        registry.put_server(server);
        self.graph.record_edges(&key, tools)
    }

    /// Record the id the remote store assigned to a tracked server.
    pub fn assign_server_id(&self, key: &McpServerKey, id: ServerId) -> bool {
        match self.registry.write().get_server_mut(key) {
            Some(server) => {
                server.id = Some(id);
                true
            }
            None => false,
        }
    }

    /// Bump a tracked tool's version; returns the new version.
    pub fn bump_tool_version(&self, key: &ToolKey) -> Option<u64> {
        self.registry
            .write()
            .get_tool_mut(key)
            .map(ToolSpec::bump_version)
    }

    pub fn untrack_tool(&self, key: &ToolKey) -> Option<ToolSpec> {
        self.registry.write().remove_tool(key)
    }

    pub fn untrack_server(&self, key: &McpServerKey) -> Option<McpServer> {
        let mut registry = self.registry.write();
        let removed = registry.remove_server(key);
        self.graph.remove_server(key);
        removed
    }

    pub fn clear(&self) {
        let mut registry = self.registry.write();
        registry.clear();
        self.graph.clear();
    }

    // ===== Reads =====

    pub fn tool(&self, key: &ToolKey) -> Option<ToolSpec> {
        self.registry.read().get_tool(key).cloned()
    }

    pub fn contains_tool(&self, key: &ToolKey) -> bool {
        self.registry.read().contains_tool(key)
    }

    pub fn server(&self, key: &McpServerKey) -> Option<McpServer> {
        self.registry.read().get_server(key).cloned()
    }

    pub fn server_by_id(&self, id: ServerId) -> Option<McpServer> {
        self.registry.read().get_server_by_id(id).cloned()
    }

    /// Tracked servers in creation order.
    pub fn servers(&self) -> Vec<McpServer> {
        self.registry.read().servers().cloned().collect()
    }

    /// Tracked tools in creation order.
    pub fn tools(&self) -> Vec<ToolSpec> {
        self.registry.read().tools().cloned().collect()
    }

    pub fn creation_order(&self) -> Vec<CreationEntry> {
        self.registry.read().creation_order().to_vec()
    }

    pub fn reference_count(&self, key: &ToolKey) -> usize {
        self.graph.reference_count(key)
    }

    pub fn referrers_of(&self, key: &ToolKey) -> BTreeSet<McpServerKey> {
        self.graph.referrers_of(key)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Deletion order for everything currently tracked.
    pub fn plan_teardown(&self) -> TeardownPlan {
        let registry = self.registry.read();
        let snapshot = self.graph.snapshot();
        plan_deletions(&snapshot, registry.creation_order())
    }

    /// Check every forward edge resolves to a tracked tool, plus index
    /// agreement. No remote calls. Returns each violation found.
    pub fn validate_local(&self) -> Vec<String> {
        let registry = self.registry.read();
        let snapshot = self.graph.snapshot();
        let mut violations = snapshot.check_bidirectional();
        for (server, tools) in &snapshot.forward {
            for tool in tools {
                if !registry.contains_tool(tool) {
                    violations.push(format!("server {server} references untracked tool {tool}"));
                }
            }
        }
        violations
    }

    pub fn statistics(&self) -> TrackerStats {
        let registry = self.registry.read();
        let snapshot = self.graph.snapshot();
        TrackerStats {
            tool_count: registry.tool_count(),
            server_count: registry.server_count(),
            edge_count: snapshot.edge_count(),
            creation_log_len: registry.creation_order().len(),
            forward: snapshot
                .forward
                .iter()
                .map(|(server, tools)| {
                    (
                        server.to_string(),
                        tools.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teardown::TeardownStep;
    use toolgraph_test_utils::{server, tool_spec as spec};

    #[test]
    fn concrete_reference_count_walkthrough() {
        let tracker = Tracker::new();
        let t1 = ToolKey::new("n1", "g1", "tool1");
        let t2 = ToolKey::new("n1", "g1", "tool2");

        tracker.track_tool(spec("tool1"));
        tracker.track_server(server("s1", &["tool1"]));
        assert_eq!(tracker.reference_count(&t1), 1);

        tracker.track_tool(spec("tool2"));
        tracker.track_server(server("s2", &["tool1", "tool2"]));
        assert_eq!(tracker.reference_count(&t1), 2);
        assert_eq!(tracker.reference_count(&t2), 1);

        tracker.untrack_server(&McpServerKey::new("n1", "s1"));
        assert_eq!(tracker.reference_count(&t1), 1);
        assert!(tracker.validate_local().is_empty());
    }

    #[test]
    fn updating_tool_list_moves_edges() {
        let tracker = Tracker::new();
        tracker.track_tool(spec("a"));
        tracker.track_tool(spec("b"));
        tracker.track_server(server("s1", &["a"]));

        let diff = tracker.track_server(server("s1", &["b"]));

        assert_eq!(diff.removed.len(), 1);
        assert_eq!(tracker.reference_count(&ToolKey::new("n1", "g1", "a")), 0);
        assert_eq!(tracker.reference_count(&ToolKey::new("n1", "g1", "b")), 1);
        assert_eq!(tracker.creation_order().len(), 3);
    }

    #[test]
    fn validate_local_reports_untracked_targets() {
        let tracker = Tracker::new();
        tracker.track_server(server("s1", &["ghost"]));

        let violations = tracker.validate_local();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("n1.g1.ghost"));
    }

    #[test]
    fn statistics_reflect_tracked_state() {
        let tracker = Tracker::new();
        tracker.track_tool(spec("a"));
        tracker.track_server(server("s1", &["a", "a"]));

        let stats = tracker.statistics();
        assert_eq!(stats.tool_count, 1);
        assert_eq!(stats.server_count, 1);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.creation_log_len, 2);
        assert_eq!(stats.forward["n1/s1"], vec!["n1.g1.a".to_string()]);
    }

    #[test]
    fn teardown_plan_uses_tracked_order() {
        let tracker = Tracker::new();
        tracker.track_tool(spec("a"));
        tracker.track_server(server("s1", &["a"]));

        let plan = tracker.plan_teardown();
        assert_eq!(
            plan.steps,
            vec![
                TeardownStep::DeleteServer(McpServerKey::new("n1", "s1")),
                TeardownStep::DeleteTool(ToolKey::new("n1", "g1", "a")),
            ]
        );
    }

    #[test]
    fn assigned_id_and_version_bump_are_visible() {
        let tracker = Tracker::new();
        tracker.track_tool(spec("a"));
        tracker.track_server(server("s1", &["a"]));

        assert!(tracker.assign_server_id(&McpServerKey::new("n1", "s1"), ServerId(9)));
        assert!(!tracker.assign_server_id(&McpServerKey::new("n1", "nope"), ServerId(1)));
        assert_eq!(
            tracker.server_by_id(ServerId(9)).map(|s| s.key.name),
            Some("s1".to_string())
        );
        assert_eq!(tracker.bump_tool_version(&ToolKey::new("n1", "g1", "a")), Some(2));
    }

    #[test]
    fn clear_empties_everything() {
        let tracker = Tracker::new();
        tracker.track_tool(spec("a"));
        tracker.track_server(server("s1", &["a"]));
        tracker.clear();

        assert!(tracker.is_empty());
        assert_eq!(tracker.snapshot(), GraphSnapshot::default());
    }
}
