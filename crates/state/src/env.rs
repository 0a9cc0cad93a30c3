use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_BASE_URL: &str = "TOOLGRAPH_BASE_URL";
pub const ENV_API_PREFIX: &str = "TOOLGRAPH_API_PREFIX";
pub const ENV_TIMEOUT_MS: &str = "TOOLGRAPH_TIMEOUT_MS";
pub const ENV_RETRY_ATTEMPTS: &str = "TOOLGRAPH_RETRY_ATTEMPTS";
pub const ENV_CACHE_TTL_SECS: &str = "TOOLGRAPH_CACHE_TTL_SECS";
pub const ENV_NAMESPACE: &str = "TOOLGRAPH_NAMESPACE";
pub const ENV_GROUP: &str = "TOOLGRAPH_GROUP";
pub const ENV_SCENARIO_DEADLINE_SECS: &str = "TOOLGRAPH_SCENARIO_DEADLINE_SECS";
pub const ENV_CONFIG: &str = "TOOLGRAPH_CONFIG";

/// Non-empty value of `key`, if set.
fn string_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Parsed value of `key`; an unparsable value is an error, not a default.
fn parsed_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match string_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(None),
    }
}

/// Console base URL from `TOOLGRAPH_BASE_URL`.
pub fn base_url() -> Option<String> {
    string_var(ENV_BASE_URL)
}

/// Console API prefix from `TOOLGRAPH_API_PREFIX`.
pub fn api_prefix() -> Option<String> {
    string_var(ENV_API_PREFIX)
}

/// Per-call timeout in milliseconds from `TOOLGRAPH_TIMEOUT_MS`.
pub fn timeout_ms() -> Result<Option<u64>> {
    parsed_var(ENV_TIMEOUT_MS)
}

pub fn retry_attempts() -> Result<Option<u32>> {
    parsed_var(ENV_RETRY_ATTEMPTS)
}

/// Existence-cache freshness window from `TOOLGRAPH_CACHE_TTL_SECS`.
pub fn cache_ttl_secs() -> Result<Option<u64>> {
    parsed_var(ENV_CACHE_TTL_SECS)
}

pub fn namespace() -> Option<String> {
    string_var(ENV_NAMESPACE)
}

pub fn group() -> Option<String> {
    string_var(ENV_GROUP)
}

pub fn scenario_deadline_secs() -> Result<Option<u64>> {
    parsed_var(ENV_SCENARIO_DEADLINE_SECS)
}

/// Settings file location: `TOOLGRAPH_CONFIG`, else
/// `<config dir>/toolgraph/settings.json`.
pub fn settings_file() -> Option<PathBuf> {
    if let Some(custom) = string_var(ENV_CONFIG) {
        return Some(PathBuf::from(custom));
    }
    dirs::config_dir().map(|d| d.join("toolgraph").join("settings.json"))
}
