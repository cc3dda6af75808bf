//! Well-known channel names.

use uuid::Uuid;

/// Broadcast channel carrying incremental [`crate::SequencedEvent`]s.
pub const PERMISSION_UPDATES: &str = "permission-updates";

/// Channel carrying [`crate::SyncRequest`]s to the authority.
pub const PERMISSION_SYNC_REQUESTS: &str = "permission-sync-requests";

/// Prefix for per-instance snapshot reply channels.
pub const PERMISSION_SYNC_REPLIES_PREFIX: &str = "permission-sync-replies";

/// Build a reply channel name unique to this subscriber instance.
///
/// Each instance listens on its own reply channel and names it in every
/// `SyncRequest` it sends, so concurrent instances never consume each
/// other's snapshots.
pub fn instance_reply_channel() -> String {
    format!("{}.{}", PERMISSION_SYNC_REPLIES_PREFIX, Uuid::now_v7())
}
