//! Stdio transport: one trusted local client, no gateway.

use rmcp::ServiceExt;
use tokio_util::sync::CancellationToken;

use crate::error::GatehouseError;
use crate::standalone::server::GatehouseMcpServer;

/// Serve `server` over stdin/stdout until the client hangs up or `cancel` fires.
pub async fn serve_stdio(server: GatehouseMcpServer, cancel: CancellationToken) -> crate::Result<()> {
    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let running = server
        .serve_with_ct(transport, cancel.clone())
        .await
        .map_err(|e| GatehouseError::Transport("stdio".into(), e.to_string()))?;

    tracing::info!("stdio transport initialized, waiting for messages");

    tokio::select! {
        result = running.waiting() => {
            match result {
                Ok(reason) => {
                    tracing::info!(?reason, "stdio transport completed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "stdio transport error");
                    return Err(GatehouseError::Transport("stdio".into(), e.to_string()));
                }
            }
        }
        _ = cancel.cancelled() => {
            tracing::info!("stdio transport cancelled");
        }
    }

    Ok(())
}
