//! Postgres-backed stores.
//!
//! Both stores share one `PgPool` and provision their own schema on startup,
//! so a fresh database works without a separate migration step.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use permsync_core::{Action, PermissionKey, PermissionRecord, Role};

use crate::permission_store::PermissionStore;
use crate::sync_status::{SyncStatus, SyncStatusStore};
use crate::StoreError;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
}

impl PostgresConfig {
    /// Read `DATABASE_URL` from the environment.
    pub fn from_env() -> Option<Self> {
        std::env::var("DATABASE_URL")
            .ok()
            .map(|database_url| Self { database_url })
    }

    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        PgPool::connect(&self.database_url)
            .await
            .map_err(db_err)
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Create the permission and sync status tables if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS role_permissions (
            role TEXT NOT NULL,
            action TEXT NOT NULL,
            active BOOLEAN NOT NULL,
            PRIMARY KEY (role, action)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_status (
            id BIGINT PRIMARY KEY,
            permissions_loaded BOOLEAN NOT NULL DEFAULT FALSE,
            sync_in_progress BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_err)?;

    info!("database schema initialized");
    Ok(())
}

/// Postgres permission store.
pub struct PostgresPermissionStore {
    pool: PgPool,
}

impl PostgresPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> PermissionRecord {
    PermissionRecord::new(
        Role::new(row.get::<String, _>("role")),
        Action::new(row.get::<String, _>("action")),
        row.get::<bool, _>("active"),
    )
}

#[async_trait]
impl PermissionStore for PostgresPermissionStore {
    async fn find(&self, key: &PermissionKey) -> Result<Option<PermissionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT role, action, active FROM role_permissions WHERE role = $1 AND action = $2",
        )
        .bind(key.role.as_str())
        .bind(key.action.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn insert(&self, record: PermissionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role, action, active)
            VALUES ($1, $2, $3)
            ON CONFLICT (role, action) DO NOTHING
            "#,
        )
        .bind(record.role.as_str())
        .bind(record.action.as_str())
        .bind(record.active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(key = %record.key(), "inserted permission row");
        Ok(())
    }

    async fn set_active(&self, key: &PermissionKey, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE role_permissions SET active = $3 WHERE role = $1 AND action = $2",
        )
        .bind(key.role.as_str())
        .bind(key.action.as_str())
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, key: &PermissionKey) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE role = $1 AND action = $2")
            .bind(key.role.as_str())
            .bind(key.action.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> Result<Vec<PermissionRecord>, StoreError> {
        let rows = sqlx::query("SELECT role, action, active FROM role_permissions")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn replace_all(&self, records: Vec<PermissionRecord>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM role_permissions")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role, action, active)
                VALUES ($1, $2, $3)
                ON CONFLICT (role, action) DO UPDATE SET active = EXCLUDED.active
                "#,
            )
            .bind(record.role.as_str())
            .bind(record.action.as_str())
            .bind(record.active)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        debug!(count = records.len(), "replaced permission table");
        Ok(())
    }
}

/// Postgres sync status store (single row, `id = 1`).
pub struct PostgresSyncStatusStore {
    pool: PgPool,
}

impl PostgresSyncStatusStore {
    const ROW_ID: i64 = 1;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStatusStore for PostgresSyncStatusStore {
    async fn load_or_init(&self) -> Result<SyncStatus, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (id, permissions_loaded, sync_in_progress)
            VALUES ($1, FALSE, FALSE)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Self::ROW_ID)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let row = sqlx::query(
            "SELECT permissions_loaded, sync_in_progress FROM sync_status WHERE id = $1",
        )
        .bind(Self::ROW_ID)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(SyncStatus {
            permissions_loaded: row.get("permissions_loaded"),
            sync_in_progress: row.get("sync_in_progress"),
        })
    }

    async fn compare_and_swap(
        &self,
        expected: SyncStatus,
        next: SyncStatus,
    ) -> Result<bool, StoreError> {
        // The WHERE clause carries the expected state, so the swap is atomic
        // at the database and two racing writers cannot both win.
        let result = sqlx::query(
            r#"
            UPDATE sync_status
            SET permissions_loaded = $2, sync_in_progress = $3
            WHERE id = $1 AND permissions_loaded = $4 AND sync_in_progress = $5
            "#,
        )
        .bind(Self::ROW_ID)
        .bind(next.permissions_loaded)
        .bind(next.sync_in_progress)
        .bind(expected.permissions_loaded)
        .bind(expected.sync_in_progress)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }
}
