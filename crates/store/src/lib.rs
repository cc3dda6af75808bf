//! `permsync-store` — persistence for permission rows and sync status.
//!
//! Two narrow storage contracts back the replication protocol:
//!
//! - [`PermissionStore`]: keyed CRUD over permission rows plus the atomic
//!   full-table replacement used when a snapshot is applied.
//! - [`SyncStatusStore`]: the subscriber's single coordination row, updated
//!   only through compare-and-swap.
//!
//! In-memory implementations serve tests/dev; Postgres implementations back
//! deployments.

pub mod permission_store;
pub mod postgres;
pub mod sync_status;

pub use permission_store::{InMemoryPermissionStore, PermissionStore};
pub use postgres::{PostgresConfig, PostgresPermissionStore, PostgresSyncStatusStore};
pub use sync_status::{InMemorySyncStatusStore, SyncStatus, SyncStatusStore};

use thiserror::Error;

use permsync_core::PermissionError;

/// Storage failure.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for PermissionError {
    fn from(err: StoreError) -> Self {
        PermissionError::storage(err.to_string())
    }
}
