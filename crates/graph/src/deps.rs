//! Forward and reverse reference indices between servers and tools.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use toolgraph_model::{McpServerKey, ToolKey};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Indices {
    forward: BTreeMap<McpServerKey, BTreeSet<ToolKey>>,
    reverse: BTreeMap<ToolKey, BTreeSet<McpServerKey>>,
}

impl Indices {
    fn link(&mut self, server: &McpServerKey, tool: &ToolKey) {
        self.forward
            .entry(server.clone())
            .or_default()
            .insert(tool.clone());
        self.reverse
            .entry(tool.clone())
            .or_default()
            .insert(server.clone());
    }

    fn unlink(&mut self, server: &McpServerKey, tool: &ToolKey) {
        if let Some(tools) = self.forward.get_mut(server) {
            tools.remove(tool);
        }
        if let Some(servers) = self.reverse.get_mut(tool) {
            servers.remove(server);
            if servers.is_empty() {
                self.reverse.remove(tool);
            }
        }
    }
}

/// What changed when a server's edges were replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    pub added: BTreeSet<ToolKey>,
    pub removed: BTreeSet<ToolKey>,
}

impl EdgeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Server → tool reference graph.
///
/// Both indices sit behind one lock so a reader never observes a
/// half-applied update. The lock is only held for in-memory work.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    inner: RwLock<Indices>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every edge of `server` with edges to `tools`.
    ///
    /// Duplicate keys collapse into one edge. Old edges are removed before
    /// new ones are added so the reverse index never keeps a stale entry.
    pub fn record_edges<I>(&self, server: &McpServerKey, tools: I) -> EdgeDiff
    where
        I: IntoIterator<Item = ToolKey>,
    {
        let next: BTreeSet<ToolKey> = tools.into_iter().collect();
        let mut indices = self.inner.write();
        let current = indices.forward.get(server).cloned().unwrap_or_default();

        let diff = EdgeDiff {
            added: next.difference(&current).cloned().collect(),
            removed: current.difference(&next).cloned().collect(),
        };
        for tool in &diff.removed {
            indices.unlink(server, tool);
        }
        for tool in &diff.added {
            indices.link(server, tool);
        }
        indices.forward.entry(server.clone()).or_default();
        drop(indices);

        debug!(
            target: "toolgraph::graph",
            server = %server,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "recorded server edges"
        );
        diff
    }

    /// Purge every forward and reverse entry naming `server`.
    ///
    /// Returns the tools it referenced.
    pub fn remove_server(&self, server: &McpServerKey) -> BTreeSet<ToolKey> {
        let mut indices = self.inner.write();
        let tools = indices.forward.remove(server).unwrap_or_default();
        for tool in &tools {
            if let Some(servers) = indices.reverse.get_mut(tool) {
                servers.remove(server);
                if servers.is_empty() {
                    indices.reverse.remove(tool);
                }
            }
        }
        tools
    }

    pub fn referrers_of(&self, tool: &ToolKey) -> BTreeSet<McpServerKey> {
        self.inner.read().reverse.get(tool).cloned().unwrap_or_default()
    }

    pub fn reference_count(&self, tool: &ToolKey) -> usize {
        self.inner.read().reverse.get(tool).map_or(0, BTreeSet::len)
    }

    pub fn edges_of(&self, server: &McpServerKey) -> BTreeSet<ToolKey> {
        self.inner.read().forward.get(server).cloned().unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().forward.values().map(BTreeSet::len).sum()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let indices = self.inner.read();
        GraphSnapshot {
            forward: indices.forward.clone(),
            reverse: indices.reverse.clone(),
        }
    }

    /// Every mismatch between the two indices; empty when consistent.
    pub fn check_bidirectional(&self) -> Vec<String> {
        self.snapshot().check_bidirectional()
    }

    pub fn clear(&self) {
        *self.inner.write() = Indices::default();
    }
}

/// Point-in-time copy of both indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub forward: BTreeMap<McpServerKey, BTreeSet<ToolKey>>,
    pub reverse: BTreeMap<ToolKey, BTreeSet<McpServerKey>>,
}

impl GraphSnapshot {
    pub fn referrers_of(&self, tool: &ToolKey) -> BTreeSet<McpServerKey> {
        self.reverse.get(tool).cloned().unwrap_or_default()
    }

    pub fn reference_count(&self, tool: &ToolKey) -> usize {
        self.reverse.get(tool).map_or(0, BTreeSet::len)
    }

    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    pub fn check_bidirectional(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (server, tools) in &self.forward {
            for tool in tools {
                if !self.reverse.get(tool).is_some_and(|s| s.contains(server)) {
                    problems.push(format!("edge {server} -> {tool} missing from reverse index"));
                }
            }
        }
        for (tool, servers) in &self.reverse {
            if servers.is_empty() {
                problems.push(format!("empty reverse entry for {tool}"));
            }
            for server in servers {
                if !self.forward.get(server).is_some_and(|t| t.contains(tool)) {
                    problems.push(format!("reverse entry {tool} <- {server} has no forward edge"));
                }
            }
        }
        problems
    }
}
