//! Boundary to the remote store holding tool specs and MCP servers.
//!
//! [`RemoteStore`] is the contract; [`HttpStore`] speaks the console HTTP
//! API, [`MemoryStore`] keeps everything in process, and [`RetryingStore`]
//! bounds any of them with per-call timeouts and jittered retries.

#![deny(unsafe_code)]

pub mod error;
pub mod http;
pub mod memory;
pub mod retry;
pub mod store;

pub use error::GatewayError;
pub use http::{HttpStore, HttpStoreConfig};
pub use memory::{CallStats, MemoryStore, MissingDeletePolicy, MAX_PAGE_SIZE};
pub use retry::{RetryPolicy, RetryingStore};
#[cfg(any(test, feature = "mock"))]
pub use store::MockRemoteStore;
pub use store::{all_servers, GatewayResult, ListError, RemoteStore};
