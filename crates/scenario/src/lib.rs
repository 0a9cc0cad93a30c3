//! Scenario runs against a tool-spec/MCP-server store.
//!
//! Each [`Scenario`] goes through setup, populate, validate, mutate and
//! revalidate. The [`Orchestrator`] tracks everything a scenario creates
//! and deletes it afterwards, servers before the tools they reference,
//! whether the scenario passed or not.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use toolgraph_gateway::MemoryStore;
//! use toolgraph_scenario::{scenarios, Orchestrator};
//! use toolgraph_validate::Validator;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let validator = Arc::new(Validator::new(store.clone()));
//! let orchestrator = Orchestrator::new(store.clone(), validator);
//!
//! let report = orchestrator.run_all(&scenarios::builtin()).await;
//! assert!(report.success());
//! assert_eq!(store.tool_count(), 0);
//! # }
//! ```

#![deny(unsafe_code)]

mod app;
pub mod cli;
pub mod context;
pub mod fixtures;
pub mod orchestrator;
pub mod report;
pub mod scenarios;

pub use app::run;
pub use cli::{Cli, Commands, OutputFormat};
pub use context::{ScenarioContext, StepError, StepResult};
pub use fixtures::{deep_merge, FixtureFactory, SERVER_PREFIX, TOOL_PREFIX};
pub use orchestrator::Orchestrator;
pub use report::{
    CheckRecord, Phase, PhaseReport, PhaseStatus, RunReport, RunSummary, ScenarioReport,
    TeardownReport,
};
pub use scenarios::Scenario;
