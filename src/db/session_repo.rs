use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::server::storage::{SessionBackend, StorageError, StoredValue};

/// Durable session storage shared by every process using the same database.
///
/// Concurrency control is a version column: conditional writes are single
/// `UPDATE`/upsert statements, so SQLite's own locking makes each one atomic.
pub struct SqliteStorage {
    pool: SqlitePool,
    ttl: Option<Duration>,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    version: i64,
    value: String,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool, ttl: Option<Duration>) -> Self {
        Self { pool, ttl }
    }

    fn expires_at(&self, now: i64) -> Option<i64> {
        self.ttl.map(|ttl| now + ttl.num_seconds())
    }

    /// Version for a freshly inserted row. Time-based so that a row deleted
    /// and re-created does not restart at a version a reader may hold.
    fn fresh_version() -> i64 {
        Utc::now().timestamp_micros()
    }
}

#[async_trait]
impl SessionBackend for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        let now = Utc::now().timestamp();

        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT version, value FROM session_records
            WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let value = serde_json::from_str(&row.value)
                    .map_err(|e| StorageError::Decode(key.to_string(), e))?;
                Ok(Some(StoredValue {
                    version: row.version as u64,
                    value,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<u64, StorageError> {
        let now = Utc::now().timestamp();

        let (version,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO session_records (key, version, value, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                version = session_records.version + 1,
                value = excluded.value,
                expires_at = excluded.expires_at
            RETURNING version
            "#,
        )
        .bind(key)
        .bind(Self::fresh_version())
        .bind(value.to_string())
        .bind(self.expires_at(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(version as u64)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
    ) -> Result<bool, StorageError> {
        let now = Utc::now().timestamp();

        let result = match expected {
            // Insert, or take over a row that has expired but not been purged.
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO session_records (key, version, value, expires_at)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(key) DO UPDATE SET
                        version = session_records.version + 1,
                        value = excluded.value,
                        expires_at = excluded.expires_at
                    WHERE session_records.expires_at IS NOT NULL
                        AND session_records.expires_at <= ?
                    "#,
                )
                .bind(key)
                .bind(Self::fresh_version())
                .bind(value.to_string())
                .bind(self.expires_at(now))
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE session_records
                    SET version = version + 1, value = ?, expires_at = ?
                    WHERE key = ? AND version = ?
                        AND (expires_at IS NULL OR expires_at > ?)
                    "#,
                )
                .bind(value.to_string())
                .bind(self.expires_at(now))
                .bind(key)
                .bind(version as i64)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let now = Utc::now().timestamp();

        // Expired rows are removed too but reported as absent, matching `get`.
        let removed: Option<(Option<i64>,)> =
            sqlx::query_as("DELETE FROM session_records WHERE key = ? RETURNING expires_at")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(matches!(removed, Some((expires_at,)) if expires_at.map_or(true, |at| at > now)))
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "DELETE FROM session_records WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup(ttl: Option<Duration>) -> (SqliteStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("sessions.db")).await.unwrap();
        (SqliteStorage::new(pool, ttl), temp_dir)
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (storage, _temp) = setup(None).await;
        assert!(storage.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        let (storage, _temp) = setup(None).await;
        let value = json!({"search_results": {"tags=cat": [{"id": 1}]}});

        let version = storage.set("k", &value).await.unwrap();
        let stored = storage.get("k").await.unwrap().unwrap();

        assert_eq!(stored.version, version);
        assert_eq!(stored.value, value);
    }

    #[tokio::test]
    async fn test_set_bumps_version() {
        let (storage, _temp) = setup(None).await;

        let first = storage.set("k", &json!(1)).await.unwrap();
        let second = storage.set("k", &json!(2)).await.unwrap();

        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_if_absent() {
        let (storage, _temp) = setup(None).await;

        assert!(storage.compare_and_set("k", None, &json!(1)).await.unwrap());
        assert!(!storage.compare_and_set("k", None, &json!(2)).await.unwrap());
        assert_eq!(storage.get("k").await.unwrap().unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_compare_and_set_detects_stale_version() {
        let (storage, _temp) = setup(None).await;
        storage.set("k", &json!("v1")).await.unwrap();
        let read = storage.get("k").await.unwrap().unwrap();

        storage.set("k", &json!("v2")).await.unwrap();

        assert!(!storage
            .compare_and_set("k", Some(read.version), &json!("stale"))
            .await
            .unwrap());

        let current = storage.get("k").await.unwrap().unwrap();
        assert_eq!(current.value, json!("v2"));
        assert!(storage
            .compare_and_set("k", Some(current.version), &json!("v3"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let (storage, _temp) = setup(None).await;
        storage.set("k", &json!(1)).await.unwrap();

        assert!(storage.delete("k").await.unwrap());
        assert!(!storage.delete("k").await.unwrap());
        assert!(storage.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_rows_are_invisible_and_replaceable() {
        let (storage, _temp) = setup(Some(Duration::seconds(-10))).await;
        storage.set("k", &json!(1)).await.unwrap();

        assert!(storage.get("k").await.unwrap().is_none());
        assert!(storage.compare_and_set("k", None, &json!(2)).await.unwrap());
        assert_eq!(storage.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_expired_reports_absent() {
        let (storage, _temp) = setup(Some(Duration::seconds(-10))).await;
        storage.set("k", &json!(1)).await.unwrap();

        assert!(!storage.delete("k").await.unwrap());
        // The row is gone, not merely hidden
        assert_eq!(storage.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_live_rows() {
        let (storage, _temp) = setup(Some(Duration::hours(24))).await;
        storage.set("k", &json!(1)).await.unwrap();

        assert_eq!(storage.purge_expired().await.unwrap(), 0);
        assert!(storage.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let (storage, _temp) = setup(None).await;
        storage.set("clientsync:a:synchronizer_state", &json!("a")).await.unwrap();
        storage.set("clientsync:b:synchronizer_state", &json!("b")).await.unwrap();

        let a = storage.get("clientsync:a:synchronizer_state").await.unwrap().unwrap();
        let b = storage.get("clientsync:b:synchronizer_state").await.unwrap().unwrap();
        assert_eq!(a.value, json!("a"));
        assert_eq!(b.value, json!("b"));
    }
}
