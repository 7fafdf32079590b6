//! Session record storage.
//!
//! Every session is one JSON record under a namespaced key:
//! ```text
//! <prefix>:<session_id>:synchronizer_state
//! ```
//!
//! Records carry a version that changes on every write, which is what
//! [`SessionBackend::compare_and_set`] checks. Records may expire after a
//! time-to-live; expired records read as absent until purged.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{BackendKind, Config};
use crate::db::{init_db, SqliteStorage};

/// A stored record and its current version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub version: u64,
    pub value: Value,
}

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Database query or connection failure.
    Database(sqlx::Error),
    /// Schema migration failure.
    Migration(sqlx::migrate::MigrateError),
    /// I/O error preparing the database location.
    IoError(PathBuf, io::Error),
    /// Stored text is not valid JSON.
    Decode(String, serde_json::Error),
}

impl StorageError {
    /// Whether the failure is likely to go away on its own (busy database,
    /// exhausted pool, connection trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(e) => match e {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    // SQLITE_BUSY / SQLITE_LOCKED and their extended codes
                    .map(|code| matches!(code & 0xff, 5 | 6))
                    .unwrap_or(false),
                _ => false,
            },
            StorageError::IoError(..) => true,
            StorageError::Migration(_) | StorageError::Decode(..) => false,
        }
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Database(e) => write!(f, "Database error: {}", e),
            StorageError::Migration(e) => write!(f, "Migration failed: {}", e),
            StorageError::IoError(path, e) => {
                write!(f, "I/O error for {}: {}", path.display(), e)
            }
            StorageError::Decode(key, e) => {
                write!(f, "Stored value for {} is not valid JSON: {}", key, e)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Database(e) => Some(e),
            StorageError::Migration(e) => Some(e),
            StorageError::IoError(_, e) => Some(e),
            StorageError::Decode(_, e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Database(e)
    }
}

/// Keyed JSON record store with optimistic concurrency.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Reads a live (non-expired) record.
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;

    /// Writes unconditionally. Returns the new version.
    async fn set(&self, key: &str, value: &Value) -> Result<u64, StorageError>;

    /// Writes only if the live record's version is `expected`
    /// (`None`: only if there is no live record). Returns whether it wrote.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
    ) -> Result<bool, StorageError>;

    /// Removes a record. Returns whether a live one existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Removes expired records. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StorageError>;
}

/// Builds the storage key for a session.
pub fn session_key(prefix: &str, session_id: &str) -> String {
    format!("{}:{}:synchronizer_state", prefix, session_id)
}

/// Opens the backend selected by the configuration.
pub async fn open_backend(config: &Config) -> Result<Arc<dyn SessionBackend>, StorageError> {
    let ttl = config.session_ttl();
    match config.backend {
        BackendKind::Memory => {
            tracing::info!("Using in-memory session storage");
            Ok(Arc::new(MemoryStorage::new(ttl)))
        }
        BackendKind::Sqlite => {
            tracing::info!("Using SQLite session storage at {}", config.database_path.display());
            let pool = init_db(&config.database_path).await?;
            Ok(Arc::new(SqliteStorage::new(pool, ttl)))
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    version: u64,
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Ephemeral in-process storage.
///
/// Versions come from one counter shared by all keys, so a deleted and
/// re-created record never reuses a version a reader may still hold.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
    ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    last_version: u64,
}

impl MemoryInner {
    fn write(&mut self, key: &str, value: &Value, expires_at: Option<DateTime<Utc>>) -> u64 {
        self.last_version += 1;
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                version: self.last_version,
                value: value.clone(),
                expires_at,
            },
        );
        self.last_version
    }
}

impl MemoryStorage {
    /// Creates an empty store; records expire `ttl` after their last write.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            inner: RwLock::new(MemoryInner::default()),
            ttl,
        }
    }

    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.map(|ttl| now + ttl)
    }
}

#[async_trait]
impl SessionBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        let inner = self.inner.read().await;
        let now = Utc::now();
        Ok(inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| StoredValue {
                version: e.version,
                value: e.value.clone(),
            }))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().await;
        let expires_at = self.expiry(Utc::now());
        Ok(inner.write(key, value, expires_at))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let current = inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.version);
        if current != expected {
            return Ok(false);
        }

        let expires_at = self.expiry(now);
        inner.write(key, value, expires_at);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        Ok(inner
            .entries
            .remove(key)
            .filter(|e| e.is_live(now))
            .is_some())
    }

    async fn purge_expired(&self) -> Result<u64, StorageError> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.is_live(now));
        Ok((before - inner.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_key() {
        assert_eq!(
            session_key("clientsync", "abc"),
            "clientsync:abc:synchronizer_state"
        );
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let storage = MemoryStorage::new(None);
        assert!(storage.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        let storage = MemoryStorage::new(None);

        let version = storage.set("k", &json!({"a": 1})).await.unwrap();
        let stored = storage.get("k").await.unwrap().unwrap();

        assert_eq!(stored.version, version);
        assert_eq!(stored.value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_if_absent() {
        let storage = MemoryStorage::new(None);

        assert!(storage.compare_and_set("k", None, &json!(1)).await.unwrap());
        assert!(!storage.compare_and_set("k", None, &json!(2)).await.unwrap());
        assert_eq!(storage.get("k").await.unwrap().unwrap().value, json!(1));
    }

    #[tokio::test]
    async fn test_compare_and_set_detects_stale_version() {
        let storage = MemoryStorage::new(None);
        storage.set("k", &json!("v1")).await.unwrap();
        let read = storage.get("k").await.unwrap().unwrap();

        // A concurrent writer gets there first.
        storage.set("k", &json!("v2")).await.unwrap();

        assert!(!storage
            .compare_and_set("k", Some(read.version), &json!("stale"))
            .await
            .unwrap());
        assert_eq!(storage.get("k").await.unwrap().unwrap().value, json!("v2"));
    }

    #[tokio::test]
    async fn test_versions_not_reused_after_delete() {
        let storage = MemoryStorage::new(None);
        let first = storage.set("k", &json!(1)).await.unwrap();
        assert!(storage.delete("k").await.unwrap());
        assert!(!storage.delete("k").await.unwrap());

        let second = storage.set("k", &json!(1)).await.unwrap();
        assert_ne!(first, second);
        assert!(!storage
            .compare_and_set("k", Some(first), &json!(2))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_records_read_as_absent() {
        let storage = MemoryStorage::new(Some(Duration::seconds(-1)));
        storage.set("k", &json!(1)).await.unwrap();

        assert!(storage.get("k").await.unwrap().is_none());
        // An expired record does not block re-creation.
        assert!(storage.compare_and_set("k", None, &json!(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired_reports_absent() {
        let storage = MemoryStorage::new(Some(Duration::seconds(-1)));
        storage.set("k", &json!(1)).await.unwrap();

        assert!(!storage.delete("k").await.unwrap());
        assert_eq!(storage.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let expiring = MemoryStorage::new(Some(Duration::seconds(-1)));
        expiring.set("a", &json!(1)).await.unwrap();
        expiring.set("b", &json!(2)).await.unwrap();
        assert_eq!(expiring.purge_expired().await.unwrap(), 2);

        let durable = MemoryStorage::new(Some(Duration::hours(1)));
        durable.set("a", &json!(1)).await.unwrap();
        assert_eq!(durable.purge_expired().await.unwrap(), 0);
        assert!(durable.get("a").await.unwrap().is_some());
    }
}
