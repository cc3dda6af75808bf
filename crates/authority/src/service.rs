//! Authority-side permission service.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use permsync_core::{
    Action, PermissionError, PermissionKey, PermissionRecord, PermissionResult, Role,
};
use permsync_events::{
    EventChannel, EventKind, PermissionEvent, SequencedEvent, SnapshotReply, topics,
};
use permsync_store::PermissionStore;

/// Owner of the canonical permission table.
///
/// Every accepted mutation is persisted first, then published as a sequenced
/// incremental event on the update channel. Sequence numbers are assigned at
/// publish time and are strictly monotonic for the lifetime of this process;
/// snapshot replies carry the latest assigned value so subscribers can
/// reconcile events they buffered while bootstrapping.
pub struct PermissionAuthority<S, U, R> {
    store: S,
    updates: U,
    replies: R,
    update_channel: String,
    sequence: AtomicU64,
}

impl<S, U, R> PermissionAuthority<S, U, R>
where
    S: PermissionStore,
    U: EventChannel<SequencedEvent>,
    R: EventChannel<SnapshotReply>,
{
    pub fn new(store: S, updates: U, replies: R) -> Self {
        Self {
            store,
            updates,
            replies,
            update_channel: topics::PERMISSION_UPDATES.to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Create a permission row.
    ///
    /// Fails with `Conflict` if the `(role, action)` key already exists. On
    /// success an `ADDED` event is published and the created record returned.
    pub async fn add(
        &self,
        role: Role,
        action: Action,
        active: bool,
    ) -> PermissionResult<PermissionRecord> {
        let record = PermissionRecord::new(role, action, active);
        let key = record.key();

        if self.store.find(&key).await?.is_some() {
            return Err(PermissionError::conflict(key));
        }

        self.store.insert(record.clone()).await?;
        self.publish_update(PermissionEvent::from_record(&record, EventKind::Added))
            .await?;

        Ok(record)
    }

    /// Update the `active` flag of an existing row.
    ///
    /// Fails with `NotFound` if no row matches. On success an `UPDATED`
    /// event is published.
    pub async fn update(
        &self,
        role: Role,
        action: Action,
        active: bool,
    ) -> PermissionResult<PermissionRecord> {
        let key = PermissionKey::new(role, action);

        if !self.store.set_active(&key, active).await? {
            return Err(PermissionError::not_found(key));
        }

        let record = PermissionRecord::new(key.role, key.action, active);
        self.publish_update(PermissionEvent::from_record(&record, EventKind::Updated))
            .await?;

        Ok(record)
    }

    /// Delete an existing row.
    ///
    /// Fails with `NotFound` if no row matches. The published `REMOVED`
    /// event carries the pre-deletion values.
    pub async fn remove(&self, role: Role, action: Action) -> PermissionResult<PermissionRecord> {
        let key = PermissionKey::new(role, action);

        let Some(record) = self.store.find(&key).await? else {
            return Err(PermissionError::not_found(key));
        };

        self.store.remove(&key).await?;
        self.publish_update(PermissionEvent::from_record(&record, EventKind::Removed))
            .await?;

        Ok(record)
    }

    /// Apply an event-shaped mutation request (the HTTP layer maps its
    /// create/update/delete verbs onto these event kinds).
    pub async fn dispatch(&self, event: PermissionEvent) -> PermissionResult<PermissionRecord> {
        match event.kind {
            EventKind::Added => self.add(event.role, event.action, event.active).await,
            EventKind::Updated => self.update(event.role, event.action, event.active).await,
            EventKind::Removed => self.remove(event.role, event.action).await,
            EventKind::LoadAll => Err(PermissionError::malformed(
                "LOAD_ALL_PERMISSIONS is not a mutation",
            )),
        }
    }

    /// Answer a full-sync request with one snapshot batch on `reply_channel`.
    ///
    /// The reply is published even when the table is empty: an empty batch
    /// is a valid, terminating answer, and skipping it would leave the
    /// requesting subscriber waiting forever.
    pub async fn serve_full_sync(&self, reply_channel: &str) -> PermissionResult<usize> {
        let records = self.store.list_all().await?;
        let count = records.len();

        let reply = SnapshotReply {
            sequence: self.sequence.load(Ordering::SeqCst),
            records,
        };

        self.replies.publish(reply_channel, reply).await?;

        info!(reply_channel, count, "served full sync snapshot");
        Ok(count)
    }

    /// Fail-closed permission check against the authority's own table.
    pub async fn has_permission(&self, token: &str, action: &str) -> PermissionResult<bool> {
        let Some(role) = permsync_auth::role_from_token(token) else {
            return Ok(false);
        };

        let key = PermissionKey::new(role, Action::new(action));
        Ok(self
            .store
            .find(&key)
            .await?
            .map(|record| record.active)
            .unwrap_or(false))
    }

    /// Permission check that surfaces denial as `Forbidden`.
    pub async fn authorize(&self, token: &str, action: &str) -> PermissionResult<()> {
        if self.has_permission(token, action).await? {
            Ok(())
        } else {
            warn!(action, "permission denied");
            Err(PermissionError::Forbidden)
        }
    }

    async fn publish_update(&self, event: PermissionEvent) -> PermissionResult<u64> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        self.updates
            .publish(&self.update_channel, SequencedEvent { sequence, event })
            .await?;

        Ok(sequence)
    }
}
