//! Full-sync request server loop.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use permsync_events::{EventChannel, SequencedEvent, SnapshotReply, SyncRequest, topics};
use permsync_store::PermissionStore;

use crate::service::PermissionAuthority;

/// Handle to control and join a background server loop.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl ServerHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

/// Listens for [`SyncRequest`]s and answers each with a snapshot batch on
/// the reply channel the requester named.
#[derive(Debug)]
pub struct SyncRequestServer;

impl SyncRequestServer {
    /// Subscribe to the request channel and spawn the serving loop.
    ///
    /// Subscribing happens before this function returns, so requests
    /// published after `spawn` resolves are never missed.
    pub async fn spawn<S, U, R, Q>(
        authority: Arc<PermissionAuthority<S, U, R>>,
        requests: Q,
    ) -> ServerHandle
    where
        S: PermissionStore + 'static,
        U: EventChannel<SequencedEvent> + 'static,
        R: EventChannel<SnapshotReply> + 'static,
        Q: EventChannel<SyncRequest> + 'static,
    {
        let mut sub = requests.subscribe(topics::PERMISSION_SYNC_REQUESTS).await;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    request = sub.recv() => match request {
                        Some(request) => {
                            info!(reply_channel = %request.reply_channel, "sync request received");
                            if let Err(err) = authority.serve_full_sync(&request.reply_channel).await {
                                warn!(error = %err, "failed to serve full sync");
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        ServerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}
