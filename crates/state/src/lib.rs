//! Run configuration for toolgraph.
//!
//! This crate provides:
//! - Typed accessors for the `TOOLGRAPH_*` environment variables.
//! - An optional JSON settings file (`settings.json`).
//! - [`Settings`], the resolved value handed down the call chain.

pub mod env;
pub mod settings;

pub use env::settings_file;
pub use settings::{
    load_file_settings, load_file_settings_from, FileSettings, Settings, SettingsLayer,
    DEFAULT_API_PREFIX, DEFAULT_BASE_URL, DEFAULT_GROUP, DEFAULT_NAMESPACE,
};
