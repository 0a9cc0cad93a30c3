//! Records shared by every toolgraph crate.
//!
//! - [`ToolKey`], [`ToolSpec`], [`ToolReference`]: callable tool specifications
//!   and the pointers servers hold to them.
//! - [`McpServerKey`], [`McpServer`], [`ServerId`]: server aggregates.
//! - [`Envelope`], [`Page`], [`PageRequest`]: the remote store's wire contract.
//! - [`CheckError`], [`ErrorKind`]: every failure a validation run can report.
//!
//! # Example
//!
//! ```rust
//! use toolgraph_model::{McpServer, McpServerKey, ToolKey, ToolReference};
//!
//! let tool = ToolKey::new("n1", "g1", "tool1");
//! let server = McpServer::new(McpServerKey::new("n1", "s1"))
//!     .with_tools(vec![ToolReference::pinned(tool.clone(), 1), ToolReference::new(tool.clone())]);
//!
//! // Duplicate references collapse into a single edge.
//! assert_eq!(server.tool_keys().len(), 1);
//! assert!(server.references(&tool));
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod error;
pub mod wire;

pub use entity::{
    McpServer, McpServerKey, ServerId, ToolKey, ToolReference, ToolSpec, MAX_SCOPE_LEN,
    MAX_TOOL_NAME_LEN,
};
pub use error::{CheckError, ErrorKind};
pub use wire::{Envelope, Page, PageError, PageRequest};
