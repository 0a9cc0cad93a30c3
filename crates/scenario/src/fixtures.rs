//! Standardized tool and server records for scenario runs.

use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use toolgraph_model::{McpServer, McpServerKey, ToolKey, ToolReference, ToolSpec};

pub const TOOL_PREFIX: &str = "integration-toolspec";
pub const SERVER_PREFIX: &str = "integration-mcpserver";
pub const FIXTURE_TAGS: [&str; 2] = ["integration-test", "automated"];

/// Builds records scoped to one namespace/group and one run.
///
/// Every generated name carries the run id so that leftovers from an
/// aborted earlier run never collide with this one.
#[derive(Debug, Clone)]
pub struct FixtureFactory {
    namespace: String,
    group: String,
    run_id: String,
}

impl FixtureFactory {
    pub fn new(namespace: impl Into<String>, group: impl Into<String>) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            namespace: namespace.into(),
            group: group.into(),
            run_id,
        }
    }

    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    fn scoped(&self, prefix: &str, name: &str) -> String {
        if name.starts_with(prefix) {
            name.to_string()
        } else {
            format!("{prefix}-{name}-{}", self.run_id)
        }
    }

    pub fn tool_name(&self, name: &str) -> String {
        self.scoped(TOOL_PREFIX, name)
    }

    pub fn tool_key(&self, name: &str) -> ToolKey {
        ToolKey::new(&self.namespace, &self.group, self.tool_name(name))
    }

    pub fn server_key(&self, name: &str) -> McpServerKey {
        McpServerKey::new(&self.namespace, self.scoped(SERVER_PREFIX, name))
    }

    /// Version-1 spec whose function takes a required `query` string.
    pub fn tool_spec(&self, name: &str) -> ToolSpec {
        self.tool_spec_with(name, Value::Null)
    }

    /// Like [`tool_spec`](Self::tool_spec), with `overrides` deep-merged
    /// into the `function` and `metadata` documents. A `tags` array in
    /// `overrides` replaces the default tags.
    pub fn tool_spec_with(&self, name: &str, overrides: Value) -> ToolSpec {
        let key = self.tool_key(name);
        let mut function = json!({
            "name": key.tool_name,
            "description": format!("Integration test tool: {}", key.tool_name),
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Test query parameter"
                    },
                    "options": {
                        "type": "object",
                        "properties": {
                            "timeout": { "type": "integer", "default": 30 },
                            "retries": { "type": "integer", "default": 3 }
                        }
                    }
                },
                "required": ["query"]
            }
        });
        let mut metadata = self.base_metadata();
        let mut tags: Vec<String> = FIXTURE_TAGS.iter().map(ToString::to_string).collect();

        if let Value::Object(mut overrides) = overrides {
            if let Some(extra) = overrides.remove("function") {
                deep_merge(&mut function, extra);
            }
            if let Some(Value::Object(extra)) = overrides.remove("metadata") {
                merge_map(&mut metadata, extra);
            }
            if let Some(Value::Array(list)) = overrides.remove("tags") {
                tags = list
                    .into_iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect();
            }
        }

        let mut spec = ToolSpec::new(key, function);
        spec.tags = tags;
        spec.metadata = metadata;
        spec
    }

    /// Server referencing each named tool, pinned to version 1.
    pub fn server(&self, name: &str, tools: &[&str]) -> McpServer {
        let refs = tools
            .iter()
            .map(|t| ToolReference::pinned(self.tool_key(t), 1))
            .collect();
        self.server_with_refs(name, refs)
    }

    /// Server holding exactly `refs`, which may point outside this run.
    pub fn server_with_refs(&self, name: &str, refs: Vec<ToolReference>) -> McpServer {
        let key = self.server_key(name);
        let mut metadata = self.base_metadata();
        metadata.insert(
            "referencedToolspecs".into(),
            Value::Array(refs.iter().map(|r| Value::String(r.key.to_string())).collect()),
        );
        let mut server = McpServer::new(key.clone()).with_tools(refs);
        server.description = format!("Integration test server: {}", key.name);
        server.auth_keys = vec![format!("test-auth-{}-{}", key.name, self.run_id)];
        server.metadata = metadata;
        server
    }

    fn base_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("createdBy".into(), json!("toolgraph"));
        metadata.insert("runId".into(), json!(self.run_id));
        metadata.insert(
            "timestamp".into(),
            json!(OffsetDateTime::now_utc().unix_timestamp()),
        );
        metadata
    }
}

/// Merge `overlay` into `base`. Objects merge key by key, recursively;
/// anything else in `overlay` replaces the value in `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => merge_map(base, overlay),
        (base, overlay) => *base = overlay,
    }
}

fn merge_map(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> FixtureFactory {
        FixtureFactory::new("ns", "grp").with_run_id("r1")
    }

    #[test]
    fn names_are_prefixed_once_and_carry_run_id() {
        let f = factory();
        assert_eq!(f.tool_name("basic"), "integration-toolspec-basic-r1");
        assert_eq!(f.tool_name("integration-toolspec-x"), "integration-toolspec-x");
        assert_eq!(f.server_key("s").name, "integration-mcpserver-s-r1");
    }

    #[test]
    fn default_tool_requires_query() {
        let spec = factory().tool_spec("a");
        assert_eq!(spec.version, 1);
        assert_eq!(spec.key.namespace, "ns");
        assert_eq!(spec.function["parameters"]["required"], json!(["query"]));
        assert_eq!(spec.tags, vec!["integration-test", "automated"]);
        assert!(spec.metadata.contains_key("timestamp"));
    }

    #[test]
    fn overrides_merge_deeply() {
        let spec = factory().tool_spec_with(
            "a",
            json!({
                "function": { "parameters": { "properties": { "limit": { "type": "integer" } } } },
                "metadata": { "purpose": "merge" },
                "tags": ["custom"]
            }),
        );
        let props = &spec.function["parameters"]["properties"];
        assert!(props.get("query").is_some());
        assert!(props.get("limit").is_some());
        assert_eq!(spec.metadata["purpose"], json!("merge"));
        assert_eq!(spec.metadata["createdBy"], json!("toolgraph"));
        assert_eq!(spec.tags, vec!["custom"]);
    }

    #[test]
    fn server_pins_version_one_and_lists_references() {
        let f = factory();
        let server = f.server("s", &["a", "b"]);
        assert_eq!(server.tools.len(), 2);
        assert!(server.tools.iter().all(|r| r.version == Some(1)));
        assert_eq!(server.auth_keys, vec!["test-auth-integration-mcpserver-s-r1-r1"]);
        assert_eq!(
            server.metadata["referencedToolspecs"],
            json!(["ns.grp.integration-toolspec-a-r1", "ns.grp.integration-toolspec-b-r1"])
        );
    }

    #[test]
    fn scalar_overlay_replaces() {
        let mut base = json!({"a": {"b": 1}});
        deep_merge(&mut base, json!({"a": 2}));
        assert_eq!(base, json!({"a": 2}));
    }
}
