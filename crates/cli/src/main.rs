//! Command-line interface for the `toolgraph` application.
//!
//! This crate is the executable entry point; everything else lives in
//! `toolgraph-scenario`.

fn main() -> anyhow::Result<()> {
    toolgraph_scenario::run()
}
