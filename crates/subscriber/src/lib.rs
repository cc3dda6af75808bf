//! `permsync-subscriber` — local replica of the authority's permission table.
//!
//! A subscriber bootstraps a complete copy of the table over a full-sync
//! request/reply exchange, stays current from the incremental update
//! channel, and answers permission checks from its local store. While the
//! replica is incomplete every check misses and is denied: fail-closed by
//! construction.

pub mod coordinator;
pub mod processor;
pub mod query;
pub mod worker;


pub use coordinator::{SyncConfig, SyncCoordinator, SyncState};
pub use processor::EventProcessor;
pub use query::PermissionChecker;
pub use worker::{SubscriberWorker, WorkerHandle};
