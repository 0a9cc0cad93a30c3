//! In-memory record of the entities a run believes it created.

use serde::Serialize;
use std::collections::BTreeMap;
use toolgraph_model::{McpServer, McpServerKey, ServerId, ToolKey, ToolSpec};

/// One entry of the creation log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "key", rename_all = "camelCase")]
pub enum CreationEntry {
    Tool(ToolKey),
    Server(McpServerKey),
}

/// Tools and servers keyed by composite identity.
///
/// Re-putting an existing key replaces the record but keeps its original
/// position in the creation log. No validation happens here.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    tools: BTreeMap<ToolKey, ToolSpec>,
    servers: BTreeMap<McpServerKey, McpServer>,
    creation_log: Vec<CreationEntry>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tool; returns the record it replaced, if any.
    pub fn put_tool(&mut self, spec: ToolSpec) -> Option<ToolSpec> {
        let key = spec.key.clone();
        let previous = self.tools.insert(key.clone(), spec);
        if previous.is_none() {
            self.creation_log.push(CreationEntry::Tool(key));
        }
        previous
    }

    /// Store a server; returns the record it replaced, if any.
    pub fn put_server(&mut self, server: McpServer) -> Option<McpServer> {
        let key = server.key.clone();
        let previous = self.servers.insert(key.clone(), server);
        if previous.is_none() {
            self.creation_log.push(CreationEntry::Server(key));
        }
        previous
    }

    pub fn get_tool(&self, key: &ToolKey) -> Option<&ToolSpec> {
        self.tools.get(key)
    }

    pub fn get_tool_mut(&mut self, key: &ToolKey) -> Option<&mut ToolSpec> {
        self.tools.get_mut(key)
    }

    pub fn get_server(&self, key: &McpServerKey) -> Option<&McpServer> {
        self.servers.get(key)
    }

    pub fn get_server_mut(&mut self, key: &McpServerKey) -> Option<&mut McpServer> {
        self.servers.get_mut(key)
    }

    pub fn get_server_by_id(&self, id: ServerId) -> Option<&McpServer> {
        self.servers.values().find(|s| s.id == Some(id))
    }

    pub fn remove_tool(&mut self, key: &ToolKey) -> Option<ToolSpec> {
        let removed = self.tools.remove(key)?;
        self.creation_log
            .retain(|entry| !matches!(entry, CreationEntry::Tool(k) if k == key));
        Some(removed)
    }

    pub fn remove_server(&mut self, key: &McpServerKey) -> Option<McpServer> {
        let removed = self.servers.remove(key)?;
        self.creation_log
            .retain(|entry| !matches!(entry, CreationEntry::Server(k) if k == key));
        Some(removed)
    }

    pub fn contains_tool(&self, key: &ToolKey) -> bool {
        self.tools.contains_key(key)
    }

    /// Tools in creation order.
    pub fn tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.creation_log.iter().filter_map(|entry| match entry {
            CreationEntry::Tool(key) => self.tools.get(key),
            CreationEntry::Server(_) => None,
        })
    }

    /// Servers in creation order.
    pub fn servers(&self) -> impl Iterator<Item = &McpServer> {
        self.creation_log.iter().filter_map(|entry| match entry {
            CreationEntry::Server(key) => self.servers.get(key),
            CreationEntry::Tool(_) => None,
        })
    }

    pub fn creation_order(&self) -> &[CreationEntry] {
        &self.creation_log
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.servers.is_empty()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
        self.servers.clear();
        self.creation_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolSpec {
        ToolSpec::new(ToolKey::new("n1", "g1", name), json!({}))
    }

    #[test]
    fn creation_log_keeps_first_insertion_position() {
        let mut registry = EntityRegistry::new();
        registry.put_tool(tool("a"));
        registry.put_server(McpServer::new(McpServerKey::new("n1", "s")));
        registry.put_tool(tool("b"));

        let mut updated = tool("a");
        updated.bump_version();
        let previous = registry.put_tool(updated);

        assert_eq!(previous.map(|p| p.version), Some(1));
        assert_eq!(registry.creation_order().len(), 3);
        assert_eq!(
            registry.creation_order()[0],
            CreationEntry::Tool(ToolKey::new("n1", "g1", "a"))
        );
        let versions: Vec<u64> = registry.tools().map(|t| t.version).collect();
        assert_eq!(versions, vec![2, 1]);
    }

    #[test]
    fn remove_drops_record_and_log_entry() {
        let mut registry = EntityRegistry::new();
        registry.put_tool(tool("a"));
        let key = ToolKey::new("n1", "g1", "a");

        assert!(registry.remove_tool(&key).is_some());
        assert!(registry.remove_tool(&key).is_none());
        assert!(registry.creation_order().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn server_lookup_by_assigned_id() {
        let mut registry = EntityRegistry::new();
        registry.put_server(McpServer::new(McpServerKey::new("n1", "s1")).with_id(ServerId(7)));
        registry.put_server(McpServer::new(McpServerKey::new("n1", "s2")));

        let found = registry.get_server_by_id(ServerId(7)).map(|s| s.key.name.as_str());
        assert_eq!(found, Some("s1"));
        assert!(registry.get_server_by_id(ServerId(8)).is_none());
    }
}
