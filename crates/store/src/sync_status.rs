//! Subscriber sync status persistence.
//!
//! One row per subscriber instance records where it stands in the
//! replication lifecycle. The row is the sole coordination point between the
//! channel consumers, so every transition goes through compare-and-swap; a
//! plain read-then-write would let two near-simultaneous events both claim
//! the "start syncing" transition.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::StoreError;

/// Replication state row.
///
/// Invariant: `permissions_loaded` and `sync_in_progress` are never both
/// true. First boot starts with both false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatus {
    pub permissions_loaded: bool,
    pub sync_in_progress: bool,
}

impl SyncStatus {
    /// No replica yet, no sync running.
    pub const UNSYNCED: SyncStatus = SyncStatus {
        permissions_loaded: false,
        sync_in_progress: false,
    };

    /// A sync request is in flight.
    pub const SYNCING: SyncStatus = SyncStatus {
        permissions_loaded: false,
        sync_in_progress: true,
    };

    /// The replica is complete and live.
    pub const SYNCED: SyncStatus = SyncStatus {
        permissions_loaded: true,
        sync_in_progress: false,
    };
}

/// Persistence for the per-instance [`SyncStatus`] row.
#[async_trait]
pub trait SyncStatusStore: Send + Sync {
    /// Read the status row, creating it in its initial state if absent.
    async fn load_or_init(&self) -> Result<SyncStatus, StoreError>;

    /// Atomically replace `expected` with `next`. Returns `false` (and
    /// changes nothing) if the stored row no longer matches `expected`.
    async fn compare_and_swap(
        &self,
        expected: SyncStatus,
        next: SyncStatus,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> SyncStatusStore for Arc<S>
where
    S: SyncStatusStore + ?Sized,
{
    async fn load_or_init(&self) -> Result<SyncStatus, StoreError> {
        (**self).load_or_init().await
    }

    async fn compare_and_swap(
        &self,
        expected: SyncStatus,
        next: SyncStatus,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(expected, next).await
    }
}

/// In-memory sync status store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySyncStatusStore {
    status: Mutex<Option<SyncStatus>>,
}

impl InMemorySyncStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the row with a specific state (crash-recovery tests).
    pub fn with_status(status: SyncStatus) -> Self {
        Self {
            status: Mutex::new(Some(status)),
        }
    }
}

#[async_trait]
impl SyncStatusStore for InMemorySyncStatusStore {
    async fn load_or_init(&self) -> Result<SyncStatus, StoreError> {
        let mut slot = self
            .status
            .lock()
            .map_err(|_| StoreError::Database("status row poisoned".to_string()))?;
        Ok(*slot.get_or_insert(SyncStatus::UNSYNCED))
    }

    async fn compare_and_swap(
        &self,
        expected: SyncStatus,
        next: SyncStatus,
    ) -> Result<bool, StoreError> {
        let mut slot = self
            .status
            .lock()
            .map_err(|_| StoreError::Database("status row poisoned".to_string()))?;
        let current = slot.get_or_insert(SyncStatus::UNSYNCED);
        if *current == expected {
            *current = next;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
