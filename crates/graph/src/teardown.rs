//! Deletion ordering that never removes a tool while a server references it.

use crate::deps::GraphSnapshot;
use crate::registry::CreationEntry;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use toolgraph_model::{McpServerKey, ToolKey};

/// A single deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "key", rename_all = "camelCase")]
pub enum TeardownStep {
    DeleteServer(McpServerKey),
    DeleteTool(ToolKey),
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteServer(key) => write!(f, "delete server {key}"),
            Self::DeleteTool(key) => write!(f, "delete tool {key}"),
        }
    }
}

/// Ordered deletion list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownPlan {
    pub steps: Vec<TeardownStep>,
}

impl TeardownPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeardownStep> {
        self.steps.iter()
    }

    /// Check that every referrer of a tool in `snapshot` is deleted strictly
    /// before the tool. Returns each violation found.
    pub fn verify(&self, snapshot: &GraphSnapshot) -> Vec<String> {
        let server_positions: HashMap<&McpServerKey, usize> = self
            .steps
            .iter()
            .enumerate()
            .filter_map(|(i, step)| match step {
                TeardownStep::DeleteServer(key) => Some((key, i)),
                TeardownStep::DeleteTool(_) => None,
            })
            .collect();

        let mut violations = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            let TeardownStep::DeleteTool(tool) = step else {
                continue;
            };
            for server in snapshot.referrers_of(tool) {
                match server_positions.get(&server) {
                    Some(&pos) if pos < i => {}
                    Some(_) => violations.push(format!(
                        "tool {tool} is deleted before its referrer {server}"
                    )),
                    None => violations.push(format!(
                        "tool {tool} is deleted while {server} is never deleted"
                    )),
                }
            }
        }
        violations
    }
}

impl<'a> IntoIterator for &'a TeardownPlan {
    type Item = &'a TeardownStep;
    type IntoIter = std::slice::Iter<'a, TeardownStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Compute the deletion order for everything in `creation_order`.
///
/// Two passes over the log: servers newest first, then tools newest first.
/// Servers that appear in `snapshot` but not in the log (recorded without a
/// registry entry) are deleted at the end of the server pass so that no tool
/// outlives a referrer.
///
/// ```
/// use toolgraph_graph::{plan_deletions, CreationEntry, GraphSnapshot, TeardownStep};
/// use toolgraph_model::{McpServerKey, ToolKey};
///
/// let t1 = ToolKey::new("n1", "g1", "tool1");
/// let t2 = ToolKey::new("n1", "g1", "tool2");
/// let s1 = McpServerKey::new("n1", "s1");
/// let s2 = McpServerKey::new("n1", "s2");
/// let log = [
///     CreationEntry::Tool(t1.clone()),
///     CreationEntry::Server(s1.clone()),
///     CreationEntry::Tool(t2.clone()),
///     CreationEntry::Server(s2.clone()),
/// ];
///
/// let plan = plan_deletions(&GraphSnapshot::default(), &log);
/// assert_eq!(
///     plan.steps,
///     vec![
///         TeardownStep::DeleteServer(s2),
///         TeardownStep::DeleteServer(s1),
///         TeardownStep::DeleteTool(t2),
///         TeardownStep::DeleteTool(t1),
///     ]
/// );
/// ```
pub fn plan_deletions(snapshot: &GraphSnapshot, creation_order: &[CreationEntry]) -> TeardownPlan {
    let mut steps = Vec::with_capacity(creation_order.len());
    let mut planned: BTreeSet<&McpServerKey> = BTreeSet::new();

    for entry in creation_order.iter().rev() {
        if let CreationEntry::Server(key) = entry {
            if planned.insert(key) {
                steps.push(TeardownStep::DeleteServer(key.clone()));
            }
        }
    }
    for key in snapshot.forward.keys() {
        if planned.insert(key) {
            steps.push(TeardownStep::DeleteServer(key.clone()));
        }
    }

    let mut seen_tools: BTreeSet<&ToolKey> = BTreeSet::new();
    for entry in creation_order.iter().rev() {
        if let CreationEntry::Tool(key) = entry {
            if seen_tools.insert(key) {
                steps.push(TeardownStep::DeleteTool(key.clone()));
            }
        }
    }

    TeardownPlan { steps }
}
