//! Subscriber-side sync state machine.
//!
//! The coordinator owns the replication lifecycle:
//!
//! - `UNSYNCED`: no replica yet. The first incremental event triggers a
//!   full-sync request; the compare-and-swap on the status row guarantees
//!   that near-simultaneous events produce exactly one request.
//! - `SYNCING`: a request is in flight. Incremental events are buffered
//!   (bounded) instead of silently dropped, and a bounded deadline guards
//!   against a reply that never comes.
//! - `SYNCED`: the replica is live. Events are applied directly, with
//!   sequence-number guards enforcing per-key publish order.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use permsync_core::{PermissionError, PermissionKey, PermissionResult};
use permsync_events::{EventChannel, SequencedEvent, SnapshotReply, SyncRequest, topics};
use permsync_store::{PermissionStore, SyncStatus, SyncStatusStore};

use crate::processor::EventProcessor;

/// Subscriber replication settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Channel carrying incremental events.
    pub update_channel: String,
    /// Channel the authority listens on for sync requests.
    pub request_channel: String,
    /// This instance's own reply channel, named in every request it sends.
    pub reply_channel: String,
    /// Bounded wait for a snapshot reply before the sync counts as failed.
    pub sync_timeout: Duration,
    /// Maximum number of events buffered while syncing.
    pub buffer_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_channel: topics::PERMISSION_UPDATES.to_string(),
            request_channel: topics::PERMISSION_SYNC_REQUESTS.to_string(),
            reply_channel: topics::instance_reply_channel(),
            sync_timeout: Duration::from_secs(5),
            buffer_capacity: 256,
        }
    }
}

/// Replication lifecycle state, derived from the persisted status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Syncing,
    Synced,
}

impl From<SyncStatus> for SyncState {
    fn from(status: SyncStatus) -> Self {
        if status.permissions_loaded {
            SyncState::Synced
        } else if status.sync_in_progress {
            SyncState::Syncing
        } else {
            SyncState::Unsynced
        }
    }
}

/// Drives bootstrap and steady-state replication for one subscriber
/// instance.
pub struct SyncCoordinator<S, T, Q> {
    processor: EventProcessor<S>,
    store: S,
    status: T,
    requests: Q,
    config: SyncConfig,
    buffer: Mutex<VecDeque<SequencedEvent>>,
    last_applied: Mutex<HashMap<PermissionKey, u64>>,
    snapshot_floor: AtomicU64,
    deadline: Mutex<Option<Instant>>,
}

impl<S, T, Q> SyncCoordinator<S, T, Q>
where
    S: PermissionStore + Clone,
    T: SyncStatusStore,
    Q: EventChannel<SyncRequest>,
{
    pub fn new(store: S, status: T, requests: Q, config: SyncConfig) -> Self {
        Self {
            processor: EventProcessor::new(store.clone()),
            store,
            status,
            requests,
            config,
            buffer: Mutex::new(VecDeque::new()),
            last_applied: Mutex::new(HashMap::new()),
            snapshot_floor: AtomicU64::new(0),
            deadline: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Load (or create) the status row and resume from wherever the previous
    /// process left off.
    ///
    /// A row stuck at `sync_in_progress = true` means the process died after
    /// claiming the sync but its request died with it; the only way forward
    /// is to re-issue the request.
    pub async fn init(&self) -> PermissionResult<SyncState> {
        let status = self.status.load_or_init().await?;

        if SyncState::from(status) == SyncState::Syncing {
            info!("previous sync was interrupted, re-issuing request");
            self.send_sync_request().await?;
        }

        Ok(status.into())
    }

    /// React to one incremental event from the update channel.
    pub async fn handle_event(&self, event: SequencedEvent) -> PermissionResult<()> {
        let status = self.status.load_or_init().await?;

        if status.permissions_loaded {
            return self.apply_live(event).await;
        }

        // Not live yet: keep the event for replay after the snapshot lands.
        self.buffer_event(event)?;

        if !status.sync_in_progress {
            // Only the CAS winner sends the request; a concurrent event that
            // loses the race has already been buffered above.
            if self
                .status
                .compare_and_swap(SyncStatus::UNSYNCED, SyncStatus::SYNCING)
                .await?
            {
                self.send_sync_request().await?;
            }
        }

        Ok(())
    }

    /// Apply a full-table snapshot reply.
    ///
    /// Replaces the whole local store, marks the replica live, then replays
    /// every buffered event newer than the snapshot in sequence order.
    pub async fn handle_snapshot(&self, snapshot: SnapshotReply) -> PermissionResult<()> {
        let status = self.status.load_or_init().await?;
        if SyncState::from(status) != SyncState::Syncing {
            warn!(
                sequence = snapshot.sequence,
                "ignoring snapshot reply while not syncing"
            );
            return Ok(());
        }

        let count = snapshot.records.len();
        self.store.replace_all(snapshot.records).await?;

        if !self
            .status
            .compare_and_swap(SyncStatus::SYNCING, SyncStatus::SYNCED)
            .await?
        {
            warn!("sync status changed while the snapshot was being applied");
            return Ok(());
        }

        self.clear_deadline();
        self.snapshot_floor.store(snapshot.sequence, Ordering::SeqCst);
        if let Ok(mut last) = self.last_applied.lock() {
            last.clear();
        }

        let mut pending: Vec<SequencedEvent> = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|_| PermissionError::storage("sync buffer poisoned"))?;
            buffer.drain(..).collect()
        };
        pending.sort_by_key(|e| e.sequence);

        let mut replayed = 0usize;
        for event in pending {
            if event.sequence <= snapshot.sequence {
                continue;
            }
            self.apply_live(event).await?;
            replayed += 1;
        }

        info!(count, replayed, "full sync complete");
        Ok(())
    }

    /// Next point in time at which the sync wait expires, if one is armed.
    pub fn sync_deadline(&self) -> Option<Instant> {
        self.deadline.lock().ok().and_then(|d| *d)
    }

    /// Give up on an expired sync wait.
    ///
    /// Reverts the status row to `UNSYNCED` so the next incremental event
    /// can trigger a fresh request, and surfaces `Timeout` to the caller.
    /// Buffered events are kept: the replay filter handles them once a later
    /// sync completes. Nothing retries automatically.
    pub async fn check_sync_timeout(&self) -> PermissionResult<()> {
        let expired = self
            .sync_deadline()
            .is_some_and(|deadline| Instant::now() >= deadline);
        if !expired {
            return Ok(());
        }

        self.clear_deadline();

        if self
            .status
            .compare_and_swap(SyncStatus::SYNCING, SyncStatus::UNSYNCED)
            .await?
        {
            return Err(PermissionError::Timeout(self.config.sync_timeout));
        }

        Ok(())
    }

    fn clear_deadline(&self) {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = None;
        }
    }

    async fn send_sync_request(&self) -> PermissionResult<()> {
        if let Ok(mut deadline) = self.deadline.lock() {
            *deadline = Some(Instant::now() + self.config.sync_timeout);
        }

        let request = SyncRequest::new(self.config.reply_channel.clone());
        self.requests
            .publish(&self.config.request_channel, request)
            .await?;

        info!(reply_channel = %self.config.reply_channel, "requested full sync");
        Ok(())
    }

    fn buffer_event(&self, event: SequencedEvent) -> PermissionResult<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| PermissionError::storage("sync buffer poisoned"))?;

        if buffer.len() == self.config.buffer_capacity {
            if let Some(dropped) = buffer.pop_front() {
                warn!(
                    sequence = dropped.sequence,
                    "sync buffer full, dropping oldest event"
                );
            }
        }

        buffer.push_back(event);
        Ok(())
    }

    /// Apply one event to the live replica, guarded by sequence numbers:
    /// events at or below the snapshot floor are already reflected in the
    /// replica, and events at or below a key's last applied sequence arrived
    /// out of order.
    async fn apply_live(&self, event: SequencedEvent) -> PermissionResult<()> {
        if event.sequence <= self.snapshot_floor.load(Ordering::SeqCst) {
            debug!(
                sequence = event.sequence,
                "dropping event already covered by the snapshot"
            );
            return Ok(());
        }

        let key = PermissionKey::new(event.event.role.clone(), event.event.action.clone());
        {
            let last = self
                .last_applied
                .lock()
                .map_err(|_| PermissionError::storage("sequence map poisoned"))?;
            if let Some(&seen) = last.get(&key) {
                if event.sequence <= seen {
                    warn!(key = %key, sequence = event.sequence, seen, "dropping stale out-of-order event");
                    return Ok(());
                }
            }
        }

        match self.processor.apply(&event.event).await {
            Ok(()) => {
                if let Ok(mut last) = self.last_applied.lock() {
                    last.insert(key, event.sequence);
                }
                Ok(())
            }
            Err(PermissionError::MalformedEvent(msg)) => {
                warn!(%msg, "dropping malformed event");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use permsync_core::{Action, PermissionRecord, Role};
    use permsync_events::{EventKind, InMemoryEventChannel, PermissionEvent};
    use permsync_store::{InMemoryPermissionStore, InMemorySyncStatusStore};

    type TestCoordinator = SyncCoordinator<
        Arc<InMemoryPermissionStore>,
        Arc<InMemorySyncStatusStore>,
        Arc<InMemoryEventChannel<SyncRequest>>,
    >;

    struct Fixture {
        coordinator: TestCoordinator,
        store: Arc<InMemoryPermissionStore>,
        status: Arc<InMemorySyncStatusStore>,
        requests: Arc<InMemoryEventChannel<SyncRequest>>,
    }

    fn fixture_with(status: Arc<InMemorySyncStatusStore>, config: SyncConfig) -> Fixture {
        let store = Arc::new(InMemoryPermissionStore::new());
        let requests = Arc::new(InMemoryEventChannel::new());
        let coordinator =
            SyncCoordinator::new(store.clone(), status.clone(), requests.clone(), config);
        Fixture {
            coordinator,
            store,
            status,
            requests,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(InMemorySyncStatusStore::new()),
            SyncConfig::default(),
        )
    }

    fn sequenced(sequence: u64, role: &str, action: &str, kind: EventKind, active: bool) -> SequencedEvent {
        SequencedEvent {
            sequence,
            event: PermissionEvent {
                role: Role::new(role),
                action: Action::new(action),
                kind,
                active,
            },
        }
    }

    fn record(role: &str, action: &str, active: bool) -> PermissionRecord {
        PermissionRecord::new(Role::new(role), Action::new(action), active)
    }

    #[tokio::test]
    async fn first_event_triggers_exactly_one_sync_request() {
        let f = fixture();
        let mut request_sub = f
            .requests
            .subscribe(topics::PERMISSION_SYNC_REQUESTS)
            .await;

        let first = sequenced(1, "admin", "read", EventKind::Added, true);
        let second = sequenced(2, "admin", "write", EventKind::Added, true);

        let (a, b) = tokio::join!(
            f.coordinator.handle_event(first),
            f.coordinator.handle_event(second),
        );
        a.unwrap();
        b.unwrap();

        let request = request_sub
            .recv_timeout(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(request.reply_channel, f.coordinator.config().reply_channel);

        assert!(matches!(
            request_sub.recv_timeout(Duration::from_millis(50)).await,
            Err(_)
        ));
        assert_eq!(f.status.load_or_init().await.unwrap(), SyncStatus::SYNCING);
    }

    #[tokio::test]
    async fn snapshot_replaces_store_and_replays_newer_buffered_events() {
        let f = fixture();

        // Both events buffered; the first one wins the CAS and requests sync.
        f.coordinator
            .handle_event(sequenced(5, "admin", "read", EventKind::Added, true))
            .await
            .unwrap();
        f.coordinator
            .handle_event(sequenced(6, "editor", "write", EventKind::Added, true))
            .await
            .unwrap();

        // Snapshot taken after sequence 5: it already contains the ADMIN row.
        f.coordinator
            .handle_snapshot(SnapshotReply {
                sequence: 5,
                records: vec![record("admin", "read", true)],
            })
            .await
            .unwrap();

        assert_eq!(f.status.load_or_init().await.unwrap(), SyncStatus::SYNCED);

        let mut all = f.store.list_all().await.unwrap();
        all.sort_by(|x, y| x.role.as_str().cmp(y.role.as_str()));
        assert_eq!(
            all,
            vec![record("admin", "read", true), record("editor", "write", true)]
        );
    }

    #[tokio::test]
    async fn snapshot_clears_previous_store_contents() {
        let f = fixture();
        f.store.insert(record("stale", "row", true)).await.unwrap();

        f.coordinator
            .handle_event(sequenced(1, "admin", "read", EventKind::Added, true))
            .await
            .unwrap();
        f.coordinator
            .handle_snapshot(SnapshotReply {
                sequence: 1,
                records: vec![record("a", "x", true), record("b", "y", false)],
            })
            .await
            .unwrap();

        let all = f.store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.role.as_str() != "STALE"));
    }

    #[tokio::test]
    async fn snapshot_while_not_syncing_is_ignored() {
        let f = fixture();

        f.coordinator
            .handle_snapshot(SnapshotReply {
                sequence: 9,
                records: vec![record("a", "x", true)],
            })
            .await
            .unwrap();

        assert_eq!(f.status.load_or_init().await.unwrap(), SyncStatus::UNSYNCED);
        assert!(f.store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_sync_wait_reverts_to_unsynced() {
        let status = Arc::new(InMemorySyncStatusStore::new());
        let config = SyncConfig {
            sync_timeout: Duration::from_millis(20),
            ..SyncConfig::default()
        };
        let f = fixture_with(status, config);

        f.coordinator
            .handle_event(sequenced(1, "admin", "read", EventKind::Added, true))
            .await
            .unwrap();
        assert_eq!(f.status.load_or_init().await.unwrap(), SyncStatus::SYNCING);

        tokio::time::sleep(Duration::from_millis(40)).await;

        let err = f.coordinator.check_sync_timeout().await.unwrap_err();
        assert!(matches!(err, PermissionError::Timeout(_)));
        assert_eq!(f.status.load_or_init().await.unwrap(), SyncStatus::UNSYNCED);

        // A later event can trigger a fresh request.
        let mut request_sub = f
            .requests
            .subscribe(topics::PERMISSION_SYNC_REQUESTS)
            .await;
        f.coordinator
            .handle_event(sequenced(2, "admin", "write", EventKind::Added, true))
            .await
            .unwrap();
        assert!(
            request_sub
                .recv_timeout(Duration::from_millis(100))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn interrupted_sync_is_reissued_on_init() {
        let status = Arc::new(InMemorySyncStatusStore::with_status(SyncStatus::SYNCING));
        let f = fixture_with(status, SyncConfig::default());

        let mut request_sub = f
            .requests
            .subscribe(topics::PERMISSION_SYNC_REQUESTS)
            .await;

        let state = f.coordinator.init().await.unwrap();
        assert_eq!(state, SyncState::Syncing);

        let request = request_sub
            .recv_timeout(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(request.reply_channel, f.coordinator.config().reply_channel);
    }

    #[tokio::test]
    async fn stale_out_of_order_events_are_dropped_once_live() {
        let f = fixture();

        f.coordinator
            .handle_event(sequenced(1, "admin", "read", EventKind::Added, true))
            .await
            .unwrap();
        f.coordinator
            .handle_snapshot(SnapshotReply {
                sequence: 1,
                records: vec![record("admin", "read", true)],
            })
            .await
            .unwrap();

        // Live: newer UPDATED lands, then a stale REMOVED from before it.
        f.coordinator
            .handle_event(sequenced(3, "admin", "read", EventKind::Updated, false))
            .await
            .unwrap();
        f.coordinator
            .handle_event(sequenced(2, "admin", "read", EventKind::Removed, false))
            .await
            .unwrap();

        let key = record("admin", "read", true).key();
        let row = f.store.find(&key).await.unwrap().expect("row must survive");
        assert!(!row.active);
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        let status = Arc::new(InMemorySyncStatusStore::new());
        let config = SyncConfig {
            buffer_capacity: 2,
            ..SyncConfig::default()
        };
        let f = fixture_with(status, config);

        for seq in 1..=3 {
            f.coordinator
                .handle_event(sequenced(
                    seq,
                    "admin",
                    &format!("action_{seq}"),
                    EventKind::Added,
                    true,
                ))
                .await
                .unwrap();
        }

        // Oldest (sequence 1) was dropped; 2 and 3 replay after the snapshot.
        f.coordinator
            .handle_snapshot(SnapshotReply {
                sequence: 1,
                records: vec![],
            })
            .await
            .unwrap();

        let all = f.store.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
