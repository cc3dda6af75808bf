//! `permsync-authority` — the service that owns the canonical permission
//! table.
//!
//! The authority serves CRUD mutations, publishes an incremental event for
//! every accepted change, and answers full-sync requests with a one-batch
//! snapshot of the whole table.

pub mod service;
pub mod sync_server;

pub use service::PermissionAuthority;
pub use sync_server::{ServerHandle, SyncRequestServer};
