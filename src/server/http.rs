//! Streamable HTTP transport.
//!
//! All protocol traffic shares one route (`server.mcp_path`). The gateway is
//! a layer over the whole router, so nothing reaches the MCP service without
//! passing the authorization checks first.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio_util::sync::CancellationToken;

use crate::auth::gateway::AuthorizationGateway;
use crate::auth::middleware::authorize_request;
use crate::config::ServerConfig;
use crate::error::GatehouseError;
use crate::standalone::server::GatehouseMcpServer;

/// Mount the MCP service at `path`.
///
/// `StreamableHttpService` calls the factory per session; each clone shares
/// the server's catalog and peers handles.
pub fn mcp_router(
    path: &str,
    server: GatehouseMcpServer,
    stateful: bool,
    cancel: CancellationToken,
) -> Router {
    let http_config = StreamableHttpServerConfig {
        stateful_mode: stateful,
        cancellation_token: cancel,
        ..Default::default()
    };
    let mcp_service = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        http_config,
    );
    Router::new().route_service(path, mcp_service)
}

/// Layer the gateway ahead of every route in `routes`.
pub fn gateway_router(routes: Router, gateway: Arc<AuthorizationGateway>) -> Router {
    routes.layer(from_fn_with_state(gateway, authorize_request))
}

/// Bind `host:port` and serve `app` until `cancel` fires.
pub async fn serve_http(
    config: &ServerConfig,
    app: Router,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatehouseError::Transport("http".into(), format!("bind {}: {}", addr, e)))?;

    tracing::info!(host = %config.host, port = config.port, "HTTP server listening");
    tracing::info!(
        "Connect your MCP client to http://{}:{}{}",
        config.host,
        config.port,
        config.mcp_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| GatehouseError::Transport("http".into(), e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
