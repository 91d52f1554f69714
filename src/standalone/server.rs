//! GatehouseMcpServer, the rmcp ServerHandler that serves the catalog.
//!
//! The catalog lives behind `Arc<RwLock<Arc<Catalog>>>`: every session clone
//! shares the outer handle and the reload task swaps the inner snapshot, so
//! sessions see a new catalog on their next request.
//!
//! Peers are recorded on `initialized` so the reload task can broadcast
//! list-changed notifications.

use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    AnnotateAble, GetPromptRequestParams, GetPromptResult, ListPromptsResult,
    ListResourcesResult, PaginatedRequestParams, Prompt, PromptMessage, PromptMessageRole,
    RawResource, ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{NotificationContext, Peer, RequestContext, RoleServer};
use rmcp::ErrorData as McpError;
use tokio::sync::Mutex;

use crate::catalog::{catalog_handle, Catalog, CatalogHandle, CatalogPrompt, CatalogResource};

pub type PeersHandle = Arc<Mutex<Vec<Peer<RoleServer>>>>;

#[derive(Clone)]
pub struct GatehouseMcpServer {
    catalog: CatalogHandle,
    peers: PeersHandle,
}

impl GatehouseMcpServer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: catalog_handle(catalog),
            peers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle shared with the gateway and the reload task.
    pub fn catalog_handle(&self) -> CatalogHandle {
        self.catalog.clone()
    }

    pub fn peers_handle(&self) -> PeersHandle {
        self.peers.clone()
    }

    async fn snapshot(&self) -> Arc<Catalog> {
        self.catalog.read().await.clone()
    }
}

fn to_resource(entry: &CatalogResource) -> Resource {
    let mut raw = RawResource::new(entry.uri.clone(), entry.name.clone());
    raw.description = entry.description.clone();
    raw.mime_type = entry.mime_type.clone();
    raw.no_annotation()
}

fn to_prompt(entry: &CatalogPrompt) -> Prompt {
    Prompt::new(entry.name.clone(), entry.description.clone(), None)
}

impl ServerHandler for GatehouseMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "gatehouse".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Gatehouse: resources and prompts behind bearer-token authorization. \
                 Listing is always public; reading an entry may require a token."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_prompts_list_changed()
                .enable_resources()
                .enable_resources_list_changed()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let catalog = self.snapshot().await;
        Ok(ListResourcesResult::with_all_items(
            catalog.resources().iter().map(to_resource).collect(),
        ))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let catalog = self.snapshot().await;
        let Some(entry) = catalog.resource(&request.uri) else {
            return Err(McpError::resource_not_found(
                format!("unknown resource: {}", request.uri),
                None,
            ));
        };
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(entry.text.clone(), entry.uri.clone())],
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let catalog = self.snapshot().await;
        Ok(ListPromptsResult::with_all_items(
            catalog.prompts().iter().map(to_prompt).collect(),
        ))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let catalog = self.snapshot().await;
        let Some(entry) = catalog.prompt(&request.name) else {
            return Err(McpError::invalid_params(
                format!("unknown prompt: {}", request.name),
                None,
            ));
        };
        Ok(GetPromptResult {
            description: entry.description.clone(),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                entry.text.clone(),
            )],
        })
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        tracing::info!("MCP client initialized, storing peer for catalog notifications");
        register_peer(&self.peers, context.peer.clone()).await;
    }
}

/// Store `peer`, dropping any whose transport has closed since.
async fn register_peer(peers: &PeersHandle, peer: Peer<RoleServer>) {
    let mut peers = peers.lock().await;
    let before = peers.len();
    peers.retain(|p| !p.is_transport_closed());
    if peers.len() < before {
        tracing::debug!(removed = before - peers.len(), "dropped closed peers");
    }
    peers.push(peer);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> GatehouseMcpServer {
        let catalog = Catalog::from_toml(
            r#"
            [[resources]]
            uri = "docs://guide"
            name = "guide"
            description = "User guide"
            mime_type = "text/markdown"
            text = "hello"
            require_auth = false

            [[prompts]]
            name = "greet"
            description = "Greeting"
            text = "Say hello"
            "#,
        )
        .unwrap();
        GatehouseMcpServer::new(catalog)
    }

    #[test]
    fn test_get_info() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, "gatehouse");
        assert!(info.capabilities.resources.is_some());
        assert!(info.capabilities.prompts.is_some());
        assert!(info.capabilities.tools.is_none());
    }

    #[test]
    fn test_resource_conversion() {
        let server = server();
        let catalog = server.catalog.try_read().unwrap().clone();
        let resource = to_resource(&catalog.resources()[0]);
        assert_eq!(resource.uri, "docs://guide");
        assert_eq!(resource.name, "guide");
        assert_eq!(resource.mime_type.as_deref(), Some("text/markdown"));

        let prompt = to_prompt(&catalog.prompts()[0]);
        assert_eq!(prompt.name, "greet");
        assert_eq!(prompt.description.as_deref(), Some("Greeting"));
    }

    #[tokio::test]
    async fn test_handles_are_shared() {
        let server = server();
        let clone = server.clone();
        assert!(Arc::ptr_eq(&server.catalog, &server.catalog_handle()));
        assert!(Arc::ptr_eq(&server.catalog, &clone.catalog));
        assert!(Arc::ptr_eq(&server.peers, &clone.peers_handle()));
    }

    #[tokio::test]
    async fn test_register_peer_drops_closed_peers() {
        let peers: PeersHandle = Arc::new(Mutex::new(Vec::new()));

        let (stale_io, _stale_client) = tokio::io::duplex(4096);
        let stale = rmcp::service::serve_directly(server(), stale_io, None);
        let stale_peer = stale.peer().clone();
        stale.cancel().await.unwrap();
        assert!(stale_peer.is_transport_closed());
        register_peer(&peers, stale_peer).await;
        assert_eq!(peers.lock().await.len(), 1);

        let (live_io, _live_client) = tokio::io::duplex(4096);
        let live = rmcp::service::serve_directly(server(), live_io, None);
        register_peer(&peers, live.peer().clone()).await;

        let peers = peers.lock().await;
        assert_eq!(peers.len(), 1);
        assert!(!peers[0].is_transport_closed());
    }

    #[tokio::test]
    async fn test_swap_visible_to_clones() {
        let server = server();
        let clone = server.clone();
        *server.catalog_handle().write().await = Arc::new(Catalog::default());
        assert!(clone.snapshot().await.resources().is_empty());
    }
}
