//! Wire entities exchanged between the authority and its subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use permsync_core::{Action, PermissionRecord, Role};

/// Kind of a permission event.
///
/// Serialized with the exact wire strings; anything else fails
/// deserialization and is treated as a malformed event by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "UPDATED")]
    Updated,
    #[serde(rename = "REMOVED")]
    Removed,
    /// Bootstrap-only tag; never valid on the incremental update channel.
    #[serde(rename = "LOAD_ALL_PERMISSIONS")]
    LoadAll,
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            EventKind::Added => "ADDED",
            EventKind::Updated => "UPDATED",
            EventKind::Removed => "REMOVED",
            EventKind::LoadAll => "LOAD_ALL_PERMISSIONS",
        };
        f.write_str(s)
    }
}

/// One change notification for a single `(role, action)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEvent {
    pub role: Role,
    pub action: Action,
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    pub active: bool,
}

impl PermissionEvent {
    pub fn from_record(record: &PermissionRecord, kind: EventKind) -> Self {
        Self {
            role: record.role.clone(),
            action: record.action.clone(),
            kind,
            active: record.active,
        }
    }

    pub fn record(&self) -> PermissionRecord {
        PermissionRecord::new(self.role.clone(), self.action.clone(), self.active)
    }
}

/// An incremental event tagged with the authority-assigned publish sequence.
///
/// The sequence is monotonically increasing per authority process. It lets a
/// subscriber buffer events received mid-bootstrap and replay exactly those
/// newer than the snapshot it applied, and lets it drop stale out-of-order
/// deliveries for a key it has already moved past.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event: PermissionEvent,
}

/// Request for a full table snapshot.
///
/// `reply_channel` names the channel the requester is actually listening on,
/// so concurrent subscriber instances each get their own reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "replyChannel")]
    pub reply_channel: String,
    #[serde(rename = "timestamp")]
    pub requested_at: DateTime<Utc>,
}

impl SyncRequest {
    pub fn new(reply_channel: impl Into<String>) -> Self {
        Self {
            reply_channel: reply_channel.into(),
            requested_at: Utc::now(),
        }
    }
}

/// Full-table snapshot reply, published as one batch.
///
/// `sequence` is the highest incremental sequence published before the
/// snapshot was read. An empty `records` list is a valid, terminating reply;
/// the authority publishes it even when its table is empty so a waiting
/// subscriber always completes its bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReply {
    pub sequence: u64,
    pub records: Vec<PermissionRecord>,
}
