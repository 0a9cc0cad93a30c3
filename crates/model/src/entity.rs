//! Tool specifications, server aggregates, and their identities.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Upper bound on `toolName` length, in characters.
pub const MAX_TOOL_NAME_LEN: usize = 100;

/// Upper bound on `namespace` and `group` length, in characters.
pub const MAX_SCOPE_LEN: usize = 50;

/// Identity of a tool: `(namespace, group, toolName)`.
///
/// Parts default to empty strings when absent on the wire so that a
/// malformed remote record still deserializes and can be reported by the
/// format check instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolKey {
    pub namespace: String,
    pub group: String,
    pub tool_name: String,
}

impl ToolKey {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Names of the key parts that are empty.
    pub fn missing_parts(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.namespace.is_empty() {
            missing.push("namespace");
        }
        if self.group.is_empty() {
            missing.push("group");
        }
        if self.tool_name.is_empty() {
            missing.push("toolName");
        }
        missing
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.group, self.tool_name)
    }
}

/// A versioned tool specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    #[serde(flatten)]
    pub key: ToolKey,
    /// Starts at 1 and only ever increases.
    #[serde(default = "first_version")]
    pub version: u64,
    /// Opaque function-schema document.
    #[serde(default)]
    pub function: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn first_version() -> u64 {
    1
}

impl ToolSpec {
    /// Create a version-1 spec with no tags or metadata.
    pub fn new(key: ToolKey, function: Value) -> Self {
        Self {
            key,
            version: first_version(),
            function,
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Increment the version and return the new value.
    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Pointer from a server's tool list to a [`ToolKey`], with an optional pinned version.
///
/// The pin is signed so that a non-positive value received from the remote
/// store survives deserialization and is flagged by the format check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolReference {
    #[serde(flatten)]
    pub key: ToolKey,
    #[serde(rename = "toolVersion", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl ToolReference {
    /// Unpinned reference.
    pub fn new(key: ToolKey) -> Self {
        Self { key, version: None }
    }

    /// Reference pinned to `version`.
    pub fn pinned(key: ToolKey, version: i64) -> Self {
        Self {
            key,
            version: Some(version),
        }
    }
}

impl From<ToolKey> for ToolReference {
    fn from(key: ToolKey) -> Self {
        Self::new(key)
    }
}

/// Identity of a server aggregate: `(namespace, name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerKey {
    pub namespace: String,
    pub name: String,
}

impl McpServerKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for McpServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Numeric handle the remote store assigns to a server on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A server aggregate holding an ordered list of tool references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    /// Assigned by the remote store; `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ServerId>,
    #[serde(flatten)]
    pub key: McpServerKey,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auth_keys: Vec<String>,
    /// Order matters for exposure; duplicates count once for reference counting.
    #[serde(default)]
    pub tools: Vec<ToolReference>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl McpServer {
    pub fn new(key: McpServerKey) -> Self {
        Self {
            id: None,
            key,
            description: String::new(),
            auth_keys: Vec::new(),
            tools: Vec::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolReference>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_id(mut self, id: ServerId) -> Self {
        self.id = Some(id);
        self
    }

    /// Distinct tool keys referenced by this server.
    pub fn tool_keys(&self) -> BTreeSet<ToolKey> {
        self.tools.iter().map(|r| r.key.clone()).collect()
    }

    /// Whether any reference in the tool list targets `key`.
    pub fn references(&self, key: &ToolKey) -> bool {
        self.tools.iter().any(|r| &r.key == key)
    }
}
