//! The remote store contract.

use crate::error::GatewayError;
use async_trait::async_trait;
use toolgraph_model::{Envelope, McpServer, Page, PageRequest, ServerId, ToolKey, ToolSpec};

pub type GatewayResult<T> = Result<Envelope<T>, GatewayError>;

/// CRUD and paginated list operations for tools and servers.
///
/// Implementations return `Ok` with `success: false` for domain answers
/// (not found, rejected, invalid arguments) and `Err` only when no answer
/// was obtained. Deleting a missing key may answer either way.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn add_tool(&self, spec: &ToolSpec) -> GatewayResult<()>;

    async fn update_tool(&self, spec: &ToolSpec) -> GatewayResult<()>;

    async fn remove_tool(&self, key: &ToolKey) -> GatewayResult<()>;

    async fn tool_info(&self, key: &ToolKey) -> GatewayResult<ToolSpec>;

    async fn list_tools(&self, page: PageRequest) -> GatewayResult<Page<ToolSpec>>;

    /// Create a server; the payload is the id assigned to it.
    async fn add_server(&self, server: &McpServer) -> GatewayResult<ServerId>;

    /// Replace a server by its `id`.
    async fn update_server(&self, server: &McpServer) -> GatewayResult<()>;

    async fn remove_server(&self, id: ServerId) -> GatewayResult<()>;

    async fn server_info(&self, id: ServerId) -> GatewayResult<McpServer>;

    async fn list_servers(&self, page: PageRequest) -> GatewayResult<Page<McpServer>>;
}

/// Walk every page of the server list.
pub async fn all_servers<S>(store: &S, page_size: u32) -> Result<Vec<McpServer>, ListError>
where
    S: RemoteStore + ?Sized,
{
    let mut page = PageRequest::first(page_size);
    let mut servers = Vec::new();
    loop {
        let envelope = store.list_servers(page).await?;
        if !envelope.success {
            return Err(ListError::Rejected(envelope.message_or("server list rejected")));
        }
        let Some(batch) = envelope.data else {
            break;
        };
        let total = batch.total_count;
        let fetched = batch.list.len();
        servers.extend(batch.list);
        // a missing totalCount decodes as 0; only the short page ends the walk then
        let reached_total = total > 0 && servers.len() >= total;
        if fetched == 0 || fetched < page.page_size() as usize || reached_total {
            break;
        }
        page = page.next();
    }
    Ok(servers)
}

/// Failure while enumerating a list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("list rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgraph_model::McpServerKey;

    fn server(i: u64) -> McpServer {
        McpServer::new(McpServerKey::new("n", format!("s{i}"))).with_id(ServerId(i))
    }

    #[tokio::test]
    async fn all_servers_follows_pages_until_total() {
        let mut store = MockRemoteStore::new();
        store
            .expect_list_servers()
            .times(2)
            .returning(|page| {
                let list = match page.page_no() {
                    1 => vec![server(1), server(2)],
                    _ => vec![server(3)],
                };
                Ok(Envelope::ok(Page::new(3, list)))
            });

        let servers = all_servers(&store, 2).await.unwrap();
        assert_eq!(servers.len(), 3);
    }

    #[tokio::test]
    async fn all_servers_surfaces_rejection() {
        let mut store = MockRemoteStore::new();
        store
            .expect_list_servers()
            .times(1)
            .returning(|_| Ok(Envelope::fail("pageSize too large")));

        let err = all_servers(&store, 5000).await.unwrap_err();
        assert_eq!(err, ListError::Rejected("pageSize too large".into()));
    }

    #[tokio::test]
    async fn all_servers_without_total_count_walks_to_short_page() {
        // Given full pages that carry no totalCount
        let mut store = MockRemoteStore::new();
        store
            .expect_list_servers()
            .times(3)
            .returning(|page| {
                let list = match page.page_no() {
                    1 => vec![server(1), server(2)],
                    2 => vec![server(3), server(4)],
                    _ => vec![server(5)],
                };
                let body = serde_json::json!({ "list": list });
                let page: Page<McpServer> = serde_json::from_value(body).unwrap();
                Ok(Envelope::ok(page))
            });

        // When enumerating
        let servers = all_servers(&store, 2).await.unwrap();

        // Then every page up to the short one is fetched
        assert_eq!(servers.len(), 5);
    }
}
