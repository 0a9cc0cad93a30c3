//! Local bookkeeping for a validation run.
//!
//! The [`EntityRegistry`] records what the run believes it created; the
//! [`DependencyGraph`] derives server → tool edges from stored tool lists;
//! [`plan_deletions`] orders teardown so no tool is removed while still
//! referenced. [`Tracker`] keeps the first two in step.

#![deny(unsafe_code)]

pub mod deps;
pub mod registry;
pub mod teardown;
pub mod tracker;

pub use deps::{DependencyGraph, EdgeDiff, GraphSnapshot};
pub use registry::{CreationEntry, EntityRegistry};
pub use teardown::{plan_deletions, TeardownPlan, TeardownStep};
pub use tracker::{Tracker, TrackerStats};
