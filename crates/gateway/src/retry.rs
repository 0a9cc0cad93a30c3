//! Bounded retries with jittered exponential backoff around any store.

use crate::error::GatewayError;
use crate::store::{GatewayResult, RemoteStore};
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use toolgraph_model::{McpServer, Page, PageRequest, ServerId, ToolKey, ToolSpec};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on a single call.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that calls once and never sleeps.
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            call_timeout,
        }
    }

    /// delay = min(base_delay * 2^(attempt-1), max_delay)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// Backoff scaled by a random factor in `[0.5, 1.0]`.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let factor: f64 = rand::rng().random_range(0.5..=1.0);
        self.calculate_backoff(attempt).mul_f64(factor)
    }

    /// Run `call` until it answers, fails permanently, or attempts run out.
    ///
    /// Each attempt is bounded by `call_timeout`. Transient failures are
    /// retried; the final one is wrapped in [`GatewayError::Exhausted`].
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    operation: operation.to_string(),
                    after: self.call_timeout,
                }),
            };
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };
            if attempt >= max_attempts {
                return Err(GatewayError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            let delay = self.jittered_backoff(attempt);
            warn!(
                target: "toolgraph::gateway",
                operation,
                attempt,
                max_attempts,
                ?delay,
                error = %err,
                "remote call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Applies a [`RetryPolicy`] to every call of the wrapped store.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    async fn add_tool(&self, spec: &ToolSpec) -> GatewayResult<()> {
        self.policy
            .run("toolspec/add", || self.inner.add_tool(spec))
            .await
    }

    async fn update_tool(&self, spec: &ToolSpec) -> GatewayResult<()> {
        self.policy
            .run("toolspec/update", || self.inner.update_tool(spec))
            .await
    }

    async fn remove_tool(&self, key: &ToolKey) -> GatewayResult<()> {
        self.policy
            .run("toolspec/remove", || self.inner.remove_tool(key))
            .await
    }

    async fn tool_info(&self, key: &ToolKey) -> GatewayResult<ToolSpec> {
        self.policy
            .run("toolspec/info", || self.inner.tool_info(key))
            .await
    }

    async fn list_tools(&self, page: PageRequest) -> GatewayResult<Page<ToolSpec>> {
        self.policy
            .run("toolspec/list", || self.inner.list_tools(page))
            .await
    }

    async fn add_server(&self, server: &McpServer) -> GatewayResult<ServerId> {
        self.policy
            .run("mcp/server/add", || self.inner.add_server(server))
            .await
    }

    async fn update_server(&self, server: &McpServer) -> GatewayResult<()> {
        self.policy
            .run("mcp/server/update", || self.inner.update_server(server))
            .await
    }

    async fn remove_server(&self, id: ServerId) -> GatewayResult<()> {
        self.policy
            .run("mcp/server/remove", || self.inner.remove_server(id))
            .await
    }

    async fn server_info(&self, id: ServerId) -> GatewayResult<McpServer> {
        self.policy
            .run("mcp/server/info", || self.inner.server_info(id))
            .await
    }

    async fn list_servers(&self, page: PageRequest) -> GatewayResult<Page<McpServer>> {
        self.policy
            .run("mcp/server/list", || self.inner.list_servers(page))
            .await
    }
}
