use std::time::Duration;
use thiserror::Error;
use toolgraph_model::CheckError;

/// Failure to obtain an envelope from the remote store.
///
/// A `success: false` envelope is not an error at this layer; these
/// variants cover only the cases where no domain answer was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("{operation}: transport error: {detail}")]
    Transport { operation: String, detail: String },

    #[error("{operation}: no response within {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation}: HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation}: undecodable response: {detail}")]
    Decode { operation: String, detail: String },

    #[error("{operation}: gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    pub fn transport(operation: impl Into<String>, detail: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::Transport { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::Status { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Exhausted { operation, .. } => operation,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// ```
    /// use toolgraph_gateway::GatewayError;
    ///
    /// let busy = GatewayError::Status { operation: "toolspec/info".into(), status: 503, body: String::new() };
    /// let denied = GatewayError::Status { operation: "toolspec/info".into(), status: 403, body: String::new() };
    /// assert!(busy.is_transient());
    /// assert!(!denied.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. } | Self::Exhausted { .. } => false,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }

    pub fn into_check_error(self) -> CheckError {
        match self {
            Self::Exhausted {
                operation,
                attempts,
                last,
            } => CheckError::remote_unavailable(operation, attempts, last.to_string()),
            other => {
                let operation = other.operation().to_string();
                CheckError::remote_unavailable(operation, 1, other.to_string())
            }
        }
    }
}

impl From<GatewayError> for CheckError {
    fn from(err: GatewayError) -> Self {
        err.into_check_error()
    }
}
