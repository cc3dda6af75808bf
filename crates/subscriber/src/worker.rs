//! Subscriber event loop.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use permsync_core::PermissionResult;
use permsync_events::{EventChannel, SequencedEvent, SnapshotReply, SyncRequest};
use permsync_store::{PermissionStore, SyncStatusStore};

use crate::coordinator::SyncCoordinator;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

/// Runs one subscriber instance: consumes the update channel and this
/// instance's reply channel concurrently and feeds both into the
/// coordinator, together with the sync-wait deadline.
#[derive(Debug)]
pub struct SubscriberWorker;

impl SubscriberWorker {
    /// Subscribe, initialize the coordinator (which re-issues an interrupted
    /// sync), and spawn the processing loop.
    ///
    /// Both subscriptions are created before initialization so no message
    /// published after `spawn` resolves can be missed.
    pub async fn spawn<S, T, Q, U, R>(
        coordinator: Arc<SyncCoordinator<S, T, Q>>,
        updates: U,
        replies: R,
    ) -> PermissionResult<WorkerHandle>
    where
        S: PermissionStore + Clone + 'static,
        T: SyncStatusStore + 'static,
        Q: EventChannel<SyncRequest> + 'static,
        U: EventChannel<SequencedEvent> + 'static,
        R: EventChannel<SnapshotReply> + 'static,
    {
        let mut update_sub = updates.subscribe(&coordinator.config().update_channel).await;
        let mut reply_sub = replies.subscribe(&coordinator.config().reply_channel).await;

        coordinator.init().await?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = update_sub.recv() => match event {
                        Some(event) => {
                            if let Err(err) = coordinator.handle_event(event).await {
                                warn!(error = %err, "failed to handle incremental event");
                            }
                        }
                        None => break,
                    },
                    reply = reply_sub.recv() => match reply {
                        Some(reply) => {
                            if let Err(err) = coordinator.handle_snapshot(reply).await {
                                warn!(error = %err, "failed to apply snapshot");
                            }
                        }
                        None => break,
                    },
                    _ = wait_for(coordinator.sync_deadline()) => {
                        if let Err(err) = coordinator.check_sync_timeout().await {
                            warn!(error = %err, "full sync did not complete in time");
                        }
                    }
                }
            }
        });

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join,
        })
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
