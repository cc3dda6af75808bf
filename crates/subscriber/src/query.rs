//! Local, fail-closed permission checks.

use tracing::warn;

use permsync_core::{Action, PermissionError, PermissionKey, PermissionResult};
use permsync_store::PermissionStore;

/// Answers `has_permission` from the local replica.
///
/// This path never touches the sync coordinator: while the replica is still
/// bootstrapping, every lookup misses and the check is denied, which is the
/// correct fail-closed default.
pub struct PermissionChecker<S> {
    store: S,
}

impl<S> PermissionChecker<S>
where
    S: PermissionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// `true` iff the token carries a decodable role claim and the
    /// `(role, action)` row exists and is active.
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
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;
    use permsync_core::{PermissionRecord, Role};
    use permsync_store::InMemoryPermissionStore;

    fn mint_token(role: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"role":"{role}"}}"#));
        format!("header.{payload}.signature")
    }

    fn setup() -> (PermissionChecker<Arc<InMemoryPermissionStore>>, Arc<InMemoryPermissionStore>) {
        let store = Arc::new(InMemoryPermissionStore::new());
        (PermissionChecker::new(store.clone()), store)
    }

    #[tokio::test]
    async fn denies_tokens_without_a_decodable_role() {
        let (checker, _store) = setup();
        assert!(!checker.has_permission("not-a-token", "read").await.unwrap());
        assert!(!checker.has_permission("", "read").await.unwrap());
    }

    #[tokio::test]
    async fn denies_while_the_replica_is_empty() {
        let (checker, _store) = setup();
        assert!(
            !checker
                .has_permission(&mint_token("admin"), "read")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn grants_active_rows_case_insensitively() {
        let (checker, store) = setup();
        store
            .insert(PermissionRecord::new(
                Role::new("admin"),
                Action::new("delete_item"),
                true,
            ))
            .await
            .unwrap();

        assert!(
            checker
                .has_permission(&mint_token("admin"), "delete_item")
                .await
                .unwrap()
        );
        assert!(
            checker
                .has_permission(&format!("Bearer {}", mint_token("Admin")), "Delete_Item")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn denies_inactive_rows() {
        let (checker, store) = setup();
        store
            .insert(PermissionRecord::new(
                Role::new("admin"),
                Action::new("read"),
                false,
            ))
            .await
            .unwrap();

        assert!(
            !checker
                .has_permission(&mint_token("admin"), "read")
                .await
                .unwrap()
        );
        assert_eq!(
            checker
                .authorize(&mint_token("admin"), "read")
                .await
                .unwrap_err(),
            PermissionError::Forbidden
        );
    }
}
