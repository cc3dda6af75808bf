//! Permission row storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use permsync_core::{PermissionKey, PermissionRecord};

use crate::StoreError;

/// Keyed CRUD over permission rows.
///
/// Keys are case-normalized by construction (`Role`/`Action` uppercase their
/// input), so implementations compare and persist the normalized form only.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Look up the row for a key.
    async fn find(&self, key: &PermissionKey) -> Result<Option<PermissionRecord>, StoreError>;

    /// Insert a row. Inserting an existing key leaves the stored row
    /// unchanged; callers that must distinguish check [`Self::find`] first.
    async fn insert(&self, record: PermissionRecord) -> Result<(), StoreError>;

    /// Set the `active` flag for a key. Returns `false` if no row exists.
    async fn set_active(&self, key: &PermissionKey, active: bool) -> Result<bool, StoreError>;

    /// Delete the row for a key. Returns `false` if no row existed.
    async fn remove(&self, key: &PermissionKey) -> Result<bool, StoreError>;

    /// Read the entire table.
    async fn list_all(&self) -> Result<Vec<PermissionRecord>, StoreError>;

    /// Atomically replace the entire table with `records` (delete-all, then
    /// insert the batch). Used when a snapshot is applied.
    async fn replace_all(&self, records: Vec<PermissionRecord>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> PermissionStore for Arc<S>
where
    S: PermissionStore + ?Sized,
{
    async fn find(&self, key: &PermissionKey) -> Result<Option<PermissionRecord>, StoreError> {
        (**self).find(key).await
    }

    async fn insert(&self, record: PermissionRecord) -> Result<(), StoreError> {
        (**self).insert(record).await
    }

    async fn set_active(&self, key: &PermissionKey, active: bool) -> Result<bool, StoreError> {
        (**self).set_active(key, active).await
    }

    async fn remove(&self, key: &PermissionKey) -> Result<bool, StoreError> {
        (**self).remove(key).await
    }

    async fn list_all(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        (**self).list_all().await
    }

    async fn replace_all(&self, records: Vec<PermissionRecord>) -> Result<(), StoreError> {
        (**self).replace_all(records).await
    }
}

/// In-memory permission store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    rows: RwLock<HashMap<PermissionKey, PermissionRecord>>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn find(&self, key: &PermissionKey) -> Result<Option<PermissionRecord>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Database("row map poisoned".to_string()))?;
        Ok(rows.get(key).cloned())
    }

    async fn insert(&self, record: PermissionRecord) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Database("row map poisoned".to_string()))?;
        rows.entry(record.key()).or_insert(record);
        Ok(())
    }

    async fn set_active(&self, key: &PermissionKey, active: bool) -> Result<bool, StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Database("row map poisoned".to_string()))?;
        match rows.get_mut(key) {
            Some(row) => {
                row.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, key: &PermissionKey) -> Result<bool, StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Database("row map poisoned".to_string()))?;
        Ok(rows.remove(key).is_some())
    }

    async fn list_all(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Database("row map poisoned".to_string()))?;
        Ok(rows.values().cloned().collect())
    }

    async fn replace_all(&self, records: Vec<PermissionRecord>) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Database("row map poisoned".to_string()))?;
        rows.clear();
        for record in records {
            rows.insert(record.key(), record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permsync_core::{Action, Role};

    fn record(role: &str, action: &str, active: bool) -> PermissionRecord {
        PermissionRecord::new(Role::new(role), Action::new(action), active)
    }

    #[tokio::test]
    async fn insert_find_remove_roundtrip() {
        let store = InMemoryPermissionStore::new();
        let row = record("admin", "delete_item", true);
        let key = row.key();

        store.insert(row.clone()).await.unwrap();
        assert_eq!(store.find(&key).await.unwrap(), Some(row));

        assert!(store.remove(&key).await.unwrap());
        assert_eq!(store.find(&key).await.unwrap(), None);
        assert!(!store.remove(&key).await.unwrap());
    }

    #[tokio::test]
    async fn insert_does_not_overwrite_existing_rows() {
        let store = InMemoryPermissionStore::new();
        let first = record("admin", "read", true);
        let key = first.key();

        store.insert(first).await.unwrap();
        store.insert(record("admin", "read", false)).await.unwrap();

        assert!(store.find(&key).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn set_active_reports_missing_rows() {
        let store = InMemoryPermissionStore::new();
        let key = record("admin", "read", true).key();

        assert!(!store.set_active(&key, false).await.unwrap());

        store.insert(record("admin", "read", true)).await.unwrap();
        assert!(store.set_active(&key, false).await.unwrap());
        assert!(!store.find(&key).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn replace_all_clears_previous_contents() {
        let store = InMemoryPermissionStore::new();
        store.insert(record("old", "read", true)).await.unwrap();

        let snapshot = vec![record("a", "read", true), record("b", "write", false)];
        store.replace_all(snapshot.clone()).await.unwrap();

        let mut all = store.list_all().await.unwrap();
        all.sort_by(|x, y| x.role.as_str().cmp(y.role.as_str()));
        assert_eq!(all, snapshot);
    }
}
