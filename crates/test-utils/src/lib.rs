//! Shared test utilities for toolgraph crates.
//!
//! Environment guards for tests that touch process-global state, and
//! short builders for the tool and server records most tests need.
//! Callers that set variables still serialize with `serial_test`.

use toolgraph_model::{McpServer, McpServerKey, ToolKey, ToolReference, ToolSpec};

/// Namespace used by the builders below.
pub const NS: &str = "n1";
/// Group used by the builders below.
pub const GROUP: &str = "g1";

/// RAII guard for environment variables - restores original value on drop.
pub struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(v) = &self.previous {
            std::env::set_var(self.key, v);
        } else {
            std::env::remove_var(self.key);
        }
    }
}

/// Set an environment variable and return a guard that restores the original on drop.
///
/// # Example
/// ```
/// let _guard = toolgraph_test_utils::set_env_var("TOOLGRAPH_DOC_VAR", Some("value"));
/// assert_eq!(std::env::var("TOOLGRAPH_DOC_VAR").as_deref(), Ok("value"));
/// ```
pub fn set_env_var(key: &'static str, value: Option<&str>) -> EnvVarGuard {
    let previous = std::env::var(key).ok();
    if let Some(val) = value {
        std::env::set_var(key, val);
    } else {
        std::env::remove_var(key);
    }
    EnvVarGuard { key, previous }
}

// ===== Record builders =====

/// `n1.g1.<name>`
pub fn tool_key(name: &str) -> ToolKey {
    ToolKey::new(NS, GROUP, name)
}

/// Version-1 spec for `n1.g1.<name>` with a minimal function document.
pub fn tool_spec(name: &str) -> ToolSpec {
    ToolSpec::new(
        tool_key(name),
        serde_json::json!({ "name": name, "description": format!("test tool {name}") }),
    )
}

/// Server `n1/<name>` referencing each named tool in order, unpinned.
pub fn server(name: &str, tools: &[&str]) -> McpServer {
    McpServer::new(McpServerKey::new(NS, name)).with_tools(
        tools
            .iter()
            .map(|t| ToolReference::new(tool_key(t)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex, MutexGuard};

    fn env_guard() -> MutexGuard<'static, ()> {
        static TEST_SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
        TEST_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_set_env_var_sets_and_restores() {
        let _g = env_guard();

        const KEY: &str = "TOOLGRAPH_TEST_UTILS_TEST_VAR";
        std::env::remove_var(KEY);

        {
            let _guard = set_env_var(KEY, Some("test_value"));
            assert_eq!(std::env::var(KEY).ok(), Some("test_value".to_string()));
        }
        assert!(std::env::var(KEY).is_err());
    }

    #[test]
    fn test_set_env_var_removes_when_none() {
        let _g = env_guard();

        const KEY: &str = "TOOLGRAPH_TEST_REMOVE_VAR";
        std::env::set_var(KEY, "exists");

        {
            let _guard = set_env_var(KEY, None);
            assert!(std::env::var(KEY).is_err());
        }
        assert_eq!(std::env::var(KEY).ok(), Some("exists".to_string()));

        std::env::remove_var(KEY);
    }

    #[test]
    fn test_builders_share_scope() {
        let srv = server("s1", &["a", "b"]);
        assert_eq!(srv.key.to_string(), "n1/s1");
        assert!(srv.references(&tool_key("a")));
        assert_eq!(tool_spec("a").key, tool_key("a"));
        assert_eq!(tool_spec("a").version, 1);
    }
}
