//! Idempotent application of one incremental event.

use tracing::{debug, warn};

use permsync_core::{PermissionError, PermissionKey, PermissionResult};
use permsync_events::{EventKind, PermissionEvent};
use permsync_store::PermissionStore;

/// Applies a single [`PermissionEvent`] to the local permission store.
///
/// Delivery is at-least-once, so every branch tolerates replays: an ADDED
/// for an existing key, or an UPDATED/REMOVED for a missing key, is a logged
/// no-op rather than an error.
pub struct EventProcessor<S> {
    store: S,
}

impl<S> EventProcessor<S>
where
    S: PermissionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn apply(&self, event: &PermissionEvent) -> PermissionResult<()> {
        let key = PermissionKey::new(event.role.clone(), event.action.clone());

        match event.kind {
            EventKind::Added => {
                if self.store.find(&key).await?.is_some() {
                    warn!(key = %key, "ignoring ADDED for an existing row");
                    return Ok(());
                }
                self.store.insert(event.record()).await?;
                debug!(key = %key, active = event.active, "permission added");
            }
            EventKind::Updated => {
                if !self.store.set_active(&key, event.active).await? {
                    warn!(key = %key, "ignoring UPDATED for a missing row");
                    return Ok(());
                }
                debug!(key = %key, active = event.active, "permission updated");
            }
            EventKind::Removed => {
                if !self.store.remove(&key).await? {
                    warn!(key = %key, "ignoring REMOVED for a missing row");
                    return Ok(());
                }
                debug!(key = %key, "permission removed");
            }
            EventKind::LoadAll => {
                return Err(PermissionError::malformed(
                    "LOAD_ALL_PERMISSIONS is not an incremental event",
                ));
            }
        }

        Ok(())
    }
}
