//! Signal handling and bounded graceful shutdown.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::GatehouseError;

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Cancel `cancel` when a termination signal arrives.
pub fn spawn_signal_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = termination_signal() => {
                tracing::info!("shutdown signal received");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

/// Drive `server` to completion, allowing at most `grace` after `cancel` fires.
///
/// Returns `ShutdownTimeout` when the grace period runs out; the caller is
/// expected to exit the process.
pub async fn run_with_grace<F>(
    server: F,
    cancel: &CancellationToken,
    grace: Duration,
) -> crate::Result<()>
where
    F: Future<Output = crate::Result<()>>,
{
    tokio::pin!(server);
    tokio::select! {
        result = &mut server => return result,
        _ = cancel.cancelled() => {}
    }

    tracing::info!(grace_secs = grace.as_secs(), "shutting down");
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::error!(grace_secs = grace.as_secs(), "graceful shutdown timed out");
            Err(GatehouseError::ShutdownTimeout(grace.as_secs()))
        }
    }
}
