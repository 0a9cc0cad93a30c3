use clap::{Args, Parser, Subcommand, ValueEnum};
use toolgraph_state::SettingsLayer;

/// How `run` prints its report.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// The full run report as JSON.
    Json,
}

/// Command-line interface for the `toolgraph` application.
#[derive(Debug, Parser)]
#[command(
    name = "toolgraph",
    about = "Dependency-aware integration harness for tool specs and MCP servers"
)]
pub struct Cli {
    /// Logs at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Overrides for the environment and the settings file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Remote store base URL (overrides `TOOLGRAPH_BASE_URL`).
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
    /// Path prefix of the console API (overrides `TOOLGRAPH_API_PREFIX`).
    #[arg(long, global = true, value_name = "PATH")]
    pub api_prefix: Option<String>,
    /// Per-call timeout in milliseconds (overrides `TOOLGRAPH_TIMEOUT_MS`).
    #[arg(long, global = true, value_name = "MILLIS")]
    pub timeout_ms: Option<u64>,
    /// Attempts per remote call, including the first.
    #[arg(long, global = true, value_name = "N")]
    pub retries: Option<u32>,
    /// Freshness window of cached existence checks, in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub cache_ttl_secs: Option<u64>,
    /// Per-scenario deadline in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub deadline_secs: Option<u64>,
}

impl ConnectionArgs {
    /// The topmost settings layer. Scope flags belong to each subcommand.
    pub fn to_layer(&self, namespace: Option<String>, group: Option<String>) -> SettingsLayer {
        SettingsLayer {
            base_url: self.base_url.clone(),
            api_prefix: self.api_prefix.clone(),
            timeout_ms: self.timeout_ms,
            retry_attempts: self.retries,
            cache_ttl_secs: self.cache_ttl_secs,
            namespace,
            group,
            scenario_deadline_secs: self.deadline_secs,
        }
    }
}

/// Available `toolgraph` commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Runs scenarios and tears down everything they created.
    Run {
        /// Scenario to run (repeatable; default: all built-in scenarios).
        #[arg(long = "scenario", value_name = "NAME")]
        scenarios: Vec<String>,
        /// Runs against an in-memory store instead of the remote one.
        #[arg(long, default_value_t = false)]
        offline: bool,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Namespace for created fixtures.
        #[arg(long)]
        namespace: Option<String>,
        /// Group for created fixtures.
        #[arg(long)]
        group: Option<String>,
    },
    /// Lists built-in scenarios.
    List,
    /// Checks whether a tool spec exists in the remote store.
    Exists {
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long, required = true)]
        tool_name: String,
    },
    /// Counts the remote servers that reference a tool spec.
    Refs {
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long, required = true)]
        tool_name: String,
        /// Fails unless the count equals this value.
        #[arg(long, value_name = "N")]
        expected: Option<usize>,
    },
}
