//! Failure kinds a validation run can report.

use crate::entity::{McpServerKey, ToolKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`CheckError`], used for reporting and
/// propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    DependencyNotFound,
    ReferenceCountMismatch,
    Consistency,
    RemoteUnavailable,
    ConcurrentMutation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::DependencyNotFound => "dependency_not_found",
            Self::ReferenceCountMismatch => "reference_count_mismatch",
            Self::Consistency => "consistency",
            Self::RemoteUnavailable => "remote_unavailable",
            Self::ConcurrentMutation => "concurrent_mutation",
        }
    }

    /// Whether this kind ends the current scenario.
    ///
    /// Only exhausted remote retries are fatal; every other kind is
    /// recorded and the scenario continues.
    pub fn is_fatal_to_scenario(&self) -> bool {
        matches!(self, Self::RemoteUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed check, with enough detail to be read without the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CheckError {
    /// A tool reference is structurally malformed.
    #[error("malformed tool reference '{reference}': {}", .violations.join("; "))]
    Format {
        reference: String,
        /// Every violated rule, not just the first.
        violations: Vec<String>,
    },

    /// A referenced tool does not exist remotely, or removing it would
    /// leave a dangling reference.
    #[error("dependency not found for tool '{tool}': {detail}")]
    DependencyNotFound { tool: ToolKey, detail: String },

    /// The graph's reference count disagrees with the expected value.
    #[error(
        "reference count mismatch for tool '{tool}': expected {expected}, found {actual} (referrers: [{}])",
        join_servers(.referrers)
    )]
    ReferenceCountMismatch {
        tool: ToolKey,
        expected: usize,
        actual: usize,
        referrers: Vec<McpServerKey>,
    },

    /// One or more references of a server (or of every tracked server)
    /// failed format or existence checks.
    #[error("{scope} is inconsistent ({} failure(s)): {}", .failures.len(), .failures.join("; "))]
    Consistency { scope: String, failures: Vec<String> },

    /// The remote store could not be reached after all retries.
    #[error("remote store unavailable during {operation} after {attempts} attempt(s): {detail}")]
    RemoteUnavailable {
        operation: String,
        attempts: u32,
        detail: String,
    },

    /// Remote state changed between a read and the write that depended on it.
    #[error("concurrent mutation of {entity}: {detail}")]
    ConcurrentMutation { entity: String, detail: String },
}

fn join_servers(servers: &[McpServerKey]) -> String {
    servers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CheckError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } => ErrorKind::Format,
            Self::DependencyNotFound { .. } => ErrorKind::DependencyNotFound,
            Self::ReferenceCountMismatch { .. } => ErrorKind::ReferenceCountMismatch,
            Self::Consistency { .. } => ErrorKind::Consistency,
            Self::RemoteUnavailable { .. } => ErrorKind::RemoteUnavailable,
            Self::ConcurrentMutation { .. } => ErrorKind::ConcurrentMutation,
        }
    }

    pub fn remote_unavailable(
        operation: impl Into<String>,
        attempts: u32,
        detail: impl Into<String>,
    ) -> Self {
        Self::RemoteUnavailable {
            operation: operation.into(),
            attempts,
            detail: detail.into(),
        }
    }

    pub fn dependency_not_found(tool: ToolKey, detail: impl Into<String>) -> Self {
        Self::DependencyNotFound {
            tool,
            detail: detail.into(),
        }
    }
}
