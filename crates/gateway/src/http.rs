//! HTTP implementation of [`RemoteStore`] against the console API.

use crate::error::GatewayError;
use crate::store::{GatewayResult, RemoteStore};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use toolgraph_model::{
    Envelope, McpServer, McpServerKey, Page, PageRequest, ServerId, ToolKey, ToolSpec,
};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8848";
pub const DEFAULT_API_PREFIX: &str = "/rnacos/api/console/v2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const TOOL_ADD: &str = "/toolspec/add";
const TOOL_UPDATE: &str = "/toolspec/update";
const TOOL_REMOVE: &str = "/toolspec/remove";
const TOOL_INFO: &str = "/toolspec/info";
const TOOL_LIST: &str = "/toolspec/list";
const SERVER_ADD: &str = "/mcp/server/add";
const SERVER_UPDATE: &str = "/mcp/server/update";
const SERVER_REMOVE: &str = "/mcp/server/remove";
const SERVER_INFO: &str = "/mcp/server/info";
const SERVER_LIST: &str = "/mcp/server/list";

/// Page size used when the add response carries no id and the new server
/// has to be found by key.
const ID_LOOKUP_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub timeout: Duration,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The server `add` payload: a bare integer or an object with an `id`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerIdPayload {
    Bare(u64),
    Object { id: u64 },
}

impl From<ServerIdPayload> for ServerId {
    fn from(payload: ServerIdPayload) -> Self {
        match payload {
            ServerIdPayload::Bare(id) | ServerIdPayload::Object { id } => ServerId(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    root: String,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::transport("client", e))?;
        let root = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.api_prefix.trim_matches('/')
        );
        Ok(Self {
            client,
            root,
            timeout: config.timeout,
        })
    }

    /// Base URL plus API prefix, without a trailing slash.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.root)
    }

    async fn get<Q, T>(&self, endpoint: &'static str, query: &Q) -> GatewayResult<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(|e| self.send_error(endpoint, e))?;
        self.decode(endpoint, response).await
    }

    async fn post<B, T>(&self, endpoint: &'static str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(endpoint, e))?;
        self.decode(endpoint, response).await
    }

    fn send_error(&self, endpoint: &str, err: reqwest::Error) -> GatewayError {
        let operation = operation_name(endpoint);
        if err.is_timeout() {
            GatewayError::Timeout {
                operation,
                after: self.timeout,
            }
        } else {
            GatewayError::transport(operation, err)
        }
    }

    /// Turn an HTTP response into an envelope.
    ///
    /// 400 and 404 are domain answers: the body envelope is used when it
    /// parses, otherwise a failed envelope carrying the body text.
    async fn decode<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> GatewayResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.send_error(endpoint, e))?;
        debug!(target: "toolgraph::gateway", endpoint, status = status.as_u16(), "remote response");

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
                operation: operation_name(endpoint),
                detail: e.to_string(),
            });
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            let envelope = serde_json::from_str::<Envelope<T>>(&body)
                .ok()
                .filter(|e| !e.success)
                .unwrap_or_else(|| Envelope::fail(format!("HTTP {}: {}", status.as_u16(), body)));
            return Ok(envelope);
        }
        Err(GatewayError::Status {
            operation: operation_name(endpoint),
            status: status.as_u16(),
            body,
        })
    }

    async fn find_server_id(&self, key: &McpServerKey) -> Result<Option<ServerId>, GatewayError> {
        let mut page = PageRequest::first(ID_LOOKUP_PAGE_SIZE);
        loop {
            let envelope: Envelope<Page<McpServer>> = self.get(SERVER_LIST, &page).await?;
            let Some(batch) = envelope.into_data() else {
                return Ok(None);
            };
            if let Some(found) = batch.list.iter().find(|s| &s.key == key) {
                return Ok(found.id);
            }
            let seen = page.offset() + batch.list.len();
            if batch.list.is_empty() || seen >= batch.total_count {
                return Ok(None);
            }
            page = page.next();
        }
    }
}

fn operation_name(endpoint: &str) -> String {
    endpoint.trim_start_matches('/').to_string()
}

/// Write endpoints answer `data: true`; only `success` matters.
fn discard_payload(envelope: Envelope<Value>) -> Envelope<()> {
    envelope.map(|_| ())
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn add_tool(&self, spec: &ToolSpec) -> GatewayResult<()> {
        self.post(TOOL_ADD, spec).await.map(discard_payload)
    }

    async fn update_tool(&self, spec: &ToolSpec) -> GatewayResult<()> {
        self.post(TOOL_UPDATE, spec).await.map(discard_payload)
    }

    async fn remove_tool(&self, key: &ToolKey) -> GatewayResult<()> {
        self.post(TOOL_REMOVE, key).await.map(discard_payload)
    }

    async fn tool_info(&self, key: &ToolKey) -> GatewayResult<ToolSpec> {
        self.get(TOOL_INFO, key).await
    }

    async fn list_tools(&self, page: PageRequest) -> GatewayResult<Page<ToolSpec>> {
        self.get(TOOL_LIST, &page).await
    }

    async fn add_server(&self, server: &McpServer) -> GatewayResult<ServerId> {
        let envelope: Envelope<ServerIdPayload> = self.post(SERVER_ADD, server).await?;
        if !envelope.success {
            return Ok(Envelope {
                success: false,
                data: None,
                message: envelope.message,
            });
        }
        if let Some(payload) = envelope.data {
            return Ok(Envelope::ok(payload.into()));
        }
        match self.find_server_id(&server.key).await? {
            Some(id) => Ok(Envelope::ok(id)),
            None => Ok(Envelope::fail(format!(
                "server {} was created but no id could be found",
                server.key
            ))),
        }
    }

    async fn update_server(&self, server: &McpServer) -> GatewayResult<()> {
        self.post(SERVER_UPDATE, server).await.map(discard_payload)
    }

    async fn remove_server(&self, id: ServerId) -> GatewayResult<()> {
        self.post(SERVER_REMOVE, &json!({ "id": id }))
            .await
            .map(discard_payload)
    }

    async fn server_info(&self, id: ServerId) -> GatewayResult<McpServer> {
        self.get(SERVER_INFO, &[("id", id.0)]).await
    }

    async fn list_servers(&self, page: PageRequest) -> GatewayResult<Page<McpServer>> {
        self.get(SERVER_LIST, &page).await
    }
}
