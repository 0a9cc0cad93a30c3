//! Layered run settings: CLI flag > environment > settings file > default.

use crate::env;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8848";
pub const DEFAULT_API_PREFIX: &str = "/rnacos/api/console/v2";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_NAMESPACE: &str = "integration-test-namespace";
pub const DEFAULT_GROUP: &str = "integration-test-group";
pub const DEFAULT_SCENARIO_DEADLINE_SECS: u64 = 120;

/// One source of settings. Every field is optional; unset fields fall
/// through to the next layer.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsLayer {
    pub base_url: Option<String>,
    pub api_prefix: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub cache_ttl_secs: Option<u64>,
    pub namespace: Option<String>,
    pub group: Option<String>,
    pub scenario_deadline_secs: Option<u64>,
}

/// Contents of `settings.json`.
pub type FileSettings = SettingsLayer;

impl SettingsLayer {
    /// The layer described by `TOOLGRAPH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::base_url(),
            api_prefix: env::api_prefix(),
            timeout_ms: env::timeout_ms()?,
            retry_attempts: env::retry_attempts()?,
            cache_ttl_secs: env::cache_ttl_secs()?,
            namespace: env::namespace(),
            group: env::group(),
            scenario_deadline_secs: env::scenario_deadline_secs()?,
        })
    }

    /// Fill every unset field from `lower`.
    #[must_use]
    pub fn or(self, lower: Self) -> Self {
        Self {
            base_url: self.base_url.or(lower.base_url),
            api_prefix: self.api_prefix.or(lower.api_prefix),
            timeout_ms: self.timeout_ms.or(lower.timeout_ms),
            retry_attempts: self.retry_attempts.or(lower.retry_attempts),
            cache_ttl_secs: self.cache_ttl_secs.or(lower.cache_ttl_secs),
            namespace: self.namespace.or(lower.namespace),
            group: self.group.or(lower.group),
            scenario_deadline_secs: self.scenario_deadline_secs.or(lower.scenario_deadline_secs),
        }
    }
}

/// Load the settings file at the default location. A missing file yields
/// an empty layer.
pub fn load_file_settings() -> Result<FileSettings> {
    match env::settings_file() {
        Some(path) => load_file_settings_from(&path),
        None => Ok(FileSettings::default()),
    }
}

pub fn load_file_settings_from(path: &Path) -> Result<FileSettings> {
    if !path.exists() {
        return Ok(FileSettings::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse settings file {}", path.display()))
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub cache_ttl: Duration,
    pub namespace: String,
    pub group: String,
    pub scenario_deadline: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            namespace: DEFAULT_NAMESPACE.to_string(),
            group: DEFAULT_GROUP.to_string(),
            scenario_deadline: Duration::from_secs(DEFAULT_SCENARIO_DEADLINE_SECS),
        }
    }
}

impl Settings {
    /// Resolve `cli` over the environment, the settings file, and defaults.
    pub fn resolve(cli: SettingsLayer) -> Result<Self> {
        let env = SettingsLayer::from_env().context("failed to read environment settings")?;
        let file = load_file_settings()?;
        Self::from_layer(cli.or(env).or(file))
    }

    /// Apply defaults to whatever `layer` leaves unset, then validate.
    pub fn from_layer(layer: SettingsLayer) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            base_url: layer.base_url.unwrap_or(defaults.base_url),
            api_prefix: layer.api_prefix.unwrap_or(defaults.api_prefix),
            timeout: layer
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            retry_attempts: layer.retry_attempts.unwrap_or(defaults.retry_attempts),
            cache_ttl: layer
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            namespace: layer.namespace.unwrap_or(defaults.namespace),
            group: layer.group.unwrap_or(defaults.group),
            scenario_deadline: layer
                .scenario_deadline_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.scenario_deadline),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            bail!("timeout must be greater than zero");
        }
        if self.retry_attempts == 0 {
            bail!("retry attempts must be at least 1");
        }
        if self.scenario_deadline.is_zero() {
            bail!("scenario deadline must be greater than zero");
        }
        if self.namespace.trim().is_empty() || self.group.trim().is_empty() {
            bail!("namespace and group must not be empty");
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            bail!("base URL must start with http:// or https:// (got {})", self.base_url);
        }
        Ok(())
    }
}
