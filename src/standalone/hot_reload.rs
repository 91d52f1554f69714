//! Catalog hot-reload.
//!
//! Watches the catalog file with `notify`. After each change (100ms debounce)
//! the file is re-read; on success the inner `Arc<Catalog>` is swapped and
//! every connected peer gets resource and prompt list-changed notifications.
//! A failed reload keeps the previous catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogHandle};
use crate::standalone::server::PeersHandle;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watch `catalog_path` until `cancel` fires.
pub async fn run_catalog_reload(
    catalog_path: PathBuf,
    catalog_handle: CatalogHandle,
    peers_handle: PeersHandle,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<notify::Event>>();

    let mut watcher = match notify::recommended_watcher(move |event| {
        let _ = tx.send(event);
    }) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "failed to create catalog watcher");
            return;
        }
    };

    if let Err(e) = watcher.watch(&catalog_path, RecursiveMode::NonRecursive) {
        tracing::error!(
            path = %catalog_path.display(),
            error = %e,
            "failed to watch catalog file"
        );
        return;
    }
    // Dropping the watcher stops the OS watch.
    let _watcher = watcher;

    tracing::info!(path = %catalog_path.display(), "watching catalog for changes");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(Ok(_)) => {
                        tokio::time::sleep(DEBOUNCE).await;
                        while rx.try_recv().is_ok() {}

                        match reload_catalog(&catalog_path).await {
                            Ok(catalog) => {
                                tracing::info!(
                                    resources = catalog.resources().len(),
                                    prompts = catalog.prompts().len(),
                                    "catalog reloaded"
                                );
                                *catalog_handle.write().await = Arc::new(catalog);
                                notify_peers(&peers_handle).await;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    path = %catalog_path.display(),
                                    "catalog reload failed, keeping previous catalog"
                                );
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "catalog watcher error");
                    }
                    None => {
                        tracing::debug!("catalog watcher channel closed");
                        return;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("catalog reload cancelled");
                return;
            }
        }
    }
}

/// Send list-changed notifications; peers whose transport failed are pruned.
async fn notify_peers(peers_handle: &PeersHandle) {
    let mut peers = peers_handle.lock().await;
    let mut live_peers = Vec::with_capacity(peers.len());
    for peer in peers.drain(..) {
        let result = match peer.notify_resource_list_changed().await {
            Ok(()) => peer.notify_prompt_list_changed().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => live_peers.push(peer),
            Err(e) => {
                tracing::debug!(error = %e, "pruning stale peer after list-changed error");
            }
        }
    }
    *peers = live_peers;
}

async fn reload_catalog(catalog_path: &Path) -> crate::Result<Catalog> {
    Catalog::load(catalog_path).await
}
