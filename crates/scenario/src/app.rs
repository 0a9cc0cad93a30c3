//! Process entry: settings, runtime, store selection, and command dispatch.

use crate::cli::{Cli, Commands, ConnectionArgs, OutputFormat};
use crate::orchestrator::Orchestrator;
use crate::scenarios::{self, Scenario};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::runtime::Runtime;
use toolgraph_gateway::{HttpStore, HttpStoreConfig, MemoryStore, RemoteStore, RetryPolicy, RetryingStore};
use toolgraph_model::ToolKey;
use toolgraph_state::Settings;
use toolgraph_validate::{ValidationCache, Validator};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// The main entry point for the `toolgraph` application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command.unwrap_or(Commands::List) {
        Commands::Run {
            scenarios,
            offline,
            format,
            namespace,
            group,
        } => {
            let settings = Settings::resolve(cli.connection.to_layer(namespace, group))?;
            handle_run_command(&settings, &scenarios, offline, format)
        }
        Commands::List => handle_list_command(),
        Commands::Exists {
            namespace,
            group,
            tool_name,
        } => {
            let (settings, key) = resolve_tool(&cli.connection, namespace, group, tool_name)?;
            handle_exists_command(&settings, &key)
        }
        Commands::Refs {
            namespace,
            group,
            tool_name,
            expected,
        } => {
            let (settings, key) = resolve_tool(&cli.connection, namespace, group, tool_name)?;
            handle_refs_command(&settings, &key, expected)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_tool(
    connection: &ConnectionArgs,
    namespace: Option<String>,
    group: Option<String>,
    tool_name: String,
) -> Result<(Settings, ToolKey)> {
    let settings = Settings::resolve(connection.to_layer(namespace, group))?;
    let key = ToolKey::new(&settings.namespace, &settings.group, tool_name);
    Ok((settings, key))
}

fn retry_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy {
        max_attempts: settings.retry_attempts,
        call_timeout: settings.timeout,
        ..RetryPolicy::default()
    }
}

fn remote_store(settings: &Settings) -> Result<Arc<dyn RemoteStore>> {
    let http = HttpStore::new(HttpStoreConfig {
        base_url: settings.base_url.clone(),
        api_prefix: settings.api_prefix.clone(),
        timeout: settings.timeout,
    })
    .context("failed to build HTTP client")?;
    Ok(Arc::new(RetryingStore::new(http, retry_policy(settings))))
}

fn validator(store: Arc<dyn RemoteStore>, settings: &Settings) -> Arc<Validator> {
    Arc::new(Validator::with_cache(
        store,
        ValidationCache::new(settings.cache_ttl),
    ))
}

fn select_scenarios(names: &[String]) -> Result<Vec<Box<dyn Scenario>>> {
    if names.is_empty() {
        return Ok(scenarios::builtin());
    }
    names
        .iter()
        .map(|name| {
            scenarios::find(name).ok_or_else(|| {
                anyhow!("unknown scenario '{name}' (see `toolgraph list`)")
            })
        })
        .collect()
}

pub(crate) fn handle_run_command(
    settings: &Settings,
    names: &[String],
    offline: bool,
    format: OutputFormat,
) -> Result<()> {
    let selected = select_scenarios(names)?;
    let rt = Runtime::new()?;

    let orchestrator = if offline {
        let store = Arc::new(RetryingStore::new(MemoryStore::new(), retry_policy(settings)));
        let stats = store.clone();
        Orchestrator::new(store.clone(), validator(store, settings))
            .with_call_stats(move || stats.inner().stats())
    } else {
        let store = remote_store(settings)?;
        Orchestrator::new(store.clone(), validator(store, settings))
    };
    let orchestrator = orchestrator
        .with_scope(&settings.namespace, &settings.group)
        .with_deadline(settings.scenario_deadline);

    info!(
        target: "toolgraph::scenario",
        scenarios = selected.len(),
        offline,
        base_url = %settings.base_url,
        "starting run"
    );
    let report = rt.block_on(orchestrator.run_all(&selected));

    match format {
        OutputFormat::Text => println!("{}", report.format_summary()),
        OutputFormat::Json => println!(
            "{}",
            report.to_json().context("failed to serialize run report")?
        ),
    }

    if !report.success() {
        bail!(
            "{} of {} scenario(s) failed",
            report.summary.scenarios_failed,
            report.scenarios.len()
        );
    }
    Ok(())
}

fn handle_list_command() -> Result<()> {
    for scenario in scenarios::builtin() {
        println!("{:<26} {}", scenario.name(), scenario.description());
    }
    Ok(())
}

fn handle_exists_command(settings: &Settings, key: &ToolKey) -> Result<()> {
    let rt = Runtime::new()?;
    let validator = validator(remote_store(settings)?, settings);
    let existence = rt
        .block_on(validator.check_exists(key))
        .with_context(|| format!("existence check for {key} failed"))?;
    println!("{key}: {}", existence.detail);
    if !existence.exists {
        bail!("tool {key} does not exist");
    }
    Ok(())
}

fn handle_refs_command(settings: &Settings, key: &ToolKey, expected: Option<usize>) -> Result<()> {
    let rt = Runtime::new()?;
    let validator = validator(remote_store(settings)?, settings);
    let referrers = rt
        .block_on(validator.remote_referrers(key))
        .with_context(|| format!("reference lookup for {key} failed"))?;

    println!("{key}: referenced by {} server(s)", referrers.len());
    for server in &referrers {
        println!("  - {server}");
    }
    if let Some(expected) = expected {
        if referrers.len() != expected {
            bail!("expected {expected} reference(s), found {}", referrers.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scenario_is_an_error() {
        let err = select_scenarios(&["nope".to_string()]).err().unwrap();
        assert!(err.to_string().contains("unknown scenario 'nope'"));
    }

    #[test]
    fn empty_selection_runs_every_builtin() {
        assert_eq!(select_scenarios(&[]).unwrap().len(), 6);
        let picked = select_scenarios(&["validation-cache".to_string()]).unwrap();
        assert_eq!(picked[0].name(), "validation-cache");
    }

    #[test]
    fn offline_run_passes_and_reports_text() {
        let settings = Settings {
            scenario_deadline: std::time::Duration::from_secs(30),
            ..Settings::default()
        };
        handle_run_command(&settings, &[], true, OutputFormat::Text).unwrap();
    }
}
