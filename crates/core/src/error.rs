//! Shared error model.

use std::time::Duration;

use thiserror::Error;

use crate::permission::PermissionKey;

/// Result type used across the permission domain.
pub type PermissionResult<T> = Result<T, PermissionError>;

/// Errors surfaced at the boundary of every public permission operation.
///
/// `Conflict`, `NotFound` and `Forbidden` are user-visible outcomes and are
/// never retried. `Timeout` means a bounded wait expired and the caller may
/// try again later; nothing retries automatically. `MalformedEvent` is logged
/// at the point of receipt and the offending event is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// A permission row already exists for this key.
    #[error("permission already exists: {0}")]
    Conflict(PermissionKey),

    /// No permission row exists for this key.
    #[error("permission not found: {0}")]
    NotFound(PermissionKey),

    /// The permission check failed (missing role claim or inactive/absent row).
    #[error("forbidden")]
    Forbidden,

    /// A bounded wait expired; the operation may be retried later.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// An event could not be parsed or carries an unknown type.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An event channel failed.
    #[error("channel error: {0}")]
    Channel(String),
}

impl PermissionError {
    pub fn conflict(key: PermissionKey) -> Self {
        Self::Conflict(key)
    }

    pub fn not_found(key: PermissionKey) -> Self {
        Self::NotFound(key)
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}
