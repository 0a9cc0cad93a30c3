//! Checks run against tool references and the servers holding them.
//!
//! - Format: structural well-formedness of a reference, no I/O.
//! - Existence: one remote lookup per key per freshness window, cached.
//! - Reference count: tracked graph first, remote server list otherwise.
//! - Consistency: every reference of one or all servers, all failures kept.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use toolgraph_gateway::MemoryStore;
//! use toolgraph_model::{ToolKey, ToolSpec};
//! use toolgraph_validate::Validator;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = Arc::new(MemoryStore::new());
//! let key = ToolKey::new("n1", "g1", "tool1");
//! store.seed_tool(ToolSpec::new(key.clone(), serde_json::json!({})));
//!
//! let validator = Validator::new(store);
//! assert!(validator.check_exists(&key).await.unwrap().exists);
//! assert!(validator.check_exists(&key).await.unwrap().cached);
//! # }
//! ```

#![deny(unsafe_code)]

pub mod cache;
pub mod clock;
pub mod format;
pub mod report;
pub mod validator;

pub use cache::{existence_key, CacheEntry, ValidationCache, DEFAULT_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use format::{check_key, check_reference, key_violations, reference_violations};
pub use report::{ConsistencyReport, ReferenceIssue};
pub use validator::{Existence, HistoryEntry, Validator, ValidatorStats, LIST_PAGE_SIZE};
