//! Transport selection and the server loops.
//!
//! Stdio serves one trusted local client with no gateway. HTTP mounts the
//! protocol service and puts the authorization gateway in front of it.

pub mod http;
pub mod shutdown;
pub mod stdio;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::gateway::AuthorizationGateway;
use crate::auth::token::{build_token_validator, StaticTokenValidator, TokenValidator};
use crate::config::{GatehouseConfig, ServerConfig, TransportKind};
use crate::standalone::server::GatehouseMcpServer;

/// The `--stdio` flag wins over `server.transport`.
pub fn select_transport(stdio_flag: bool, config: &ServerConfig) -> TransportKind {
    if stdio_flag {
        TransportKind::Stdio
    } else {
        config.transport
    }
}

/// Run the selected transport until it finishes or `cancel` fires.
pub async fn start(
    kind: TransportKind,
    config: &GatehouseConfig,
    server: GatehouseMcpServer,
    cancel: CancellationToken,
) -> crate::Result<()> {
    match kind {
        TransportKind::Stdio => stdio::serve_stdio(server, cancel).await,
        TransportKind::Http => {
            let validator: Arc<dyn TokenValidator> = if config.auth.enabled {
                build_token_validator(&config.auth)?
            } else {
                Arc::new(StaticTokenValidator::deny_all())
            };
            let gateway = Arc::new(AuthorizationGateway::new(
                config.auth.enabled,
                config.server.mcp_path.clone(),
                validator,
                server.catalog_handle(),
            ));
            let routes = http::mcp_router(
                &config.server.mcp_path,
                server,
                config.server.stateful_sessions,
                cancel.clone(),
            );
            http::serve_http(&config.server, http::gateway_router(routes, gateway), cancel).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_forces_stdio() {
        let config = ServerConfig::default();
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(select_transport(true, &config), TransportKind::Stdio);
        assert_eq!(select_transport(false, &config), TransportKind::Http);
    }

    #[test]
    fn test_config_stdio_without_flag() {
        let config = ServerConfig {
            transport: TransportKind::Stdio,
            ..Default::default()
        };
        assert_eq!(select_transport(false, &config), TransportKind::Stdio);
    }

    #[tokio::test]
    async fn test_http_start_fails_on_invalid_validator_config() {
        let mut config = GatehouseConfig::default();
        config.auth.token_service_url = None;
        let result = start(
            TransportKind::Http,
            &config,
            GatehouseMcpServer::new(Default::default()),
            CancellationToken::new(),
        )
        .await;
        assert!(result.is_err());
    }
}
