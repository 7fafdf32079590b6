//! Sync error types.

use crate::server::storage::StorageError;
use crate::state::StateError;

/// Errors that can occur during sync operations.
#[derive(Debug)]
pub enum SyncError {
    /// Mutation of a section the schema does not define.
    Schema(StateError),
    /// Acknowledgment older than what the client already acknowledged.
    AckBelowPushed { seq_num: u64, pushed_seq_num: u64 },
    /// Acknowledgment of a commit that does not exist yet.
    AckBeyondPending { seq_num: u64, head_seq_num: u64 },
    /// Session identifier unusable as a storage key.
    InvalidSessionId(String),
    /// Stored session record does not decode.
    CorruptRecord {
        key: String,
        source: serde_json::Error,
    },
    /// Session state could not be encoded.
    Encode(serde_json::Error),
    /// Persistence backend failure.
    Storage(StorageError),
    /// Every compare-and-swap attempt lost against a concurrent writer.
    Contention { key: String, attempts: usize },
}

impl SyncError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Storage(e) => e.is_transient(),
            SyncError::Contention { .. } => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Schema(e) => write!(f, "Schema violation: {}", e),
            SyncError::AckBelowPushed {
                seq_num,
                pushed_seq_num,
            } => write!(
                f,
                "Acknowledged seq {} is older than pushed seq {}",
                seq_num, pushed_seq_num
            ),
            SyncError::AckBeyondPending {
                seq_num,
                head_seq_num,
            } => write!(
                f,
                "Acknowledged seq {} is beyond the latest commit {}",
                seq_num, head_seq_num
            ),
            SyncError::InvalidSessionId(id) => write!(f, "Invalid session ID: {:?}", id),
            SyncError::CorruptRecord { key, source } => {
                write!(f, "Corrupt session record {}: {}", key, source)
            }
            SyncError::Encode(e) => write!(f, "Failed to encode session state: {}", e),
            SyncError::Storage(e) => write!(f, "Storage error: {}", e),
            SyncError::Contention { key, attempts } => write!(
                f,
                "Gave up updating {} after {} concurrent modifications",
                key, attempts
            ),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Schema(e) => Some(e),
            SyncError::CorruptRecord { source, .. } => Some(source),
            SyncError::Encode(e) => Some(e),
            SyncError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StateError> for SyncError {
    fn from(e: StateError) -> Self {
        SyncError::Schema(e)
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        SyncError::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_is_retryable() {
        let err = SyncError::Contention {
            key: "clientsync:s1:synchronizer_state".to_string(),
            attempts: 8,
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("after 8"));
    }

    #[test]
    fn test_transient_storage_failure_is_retryable() {
        let err = SyncError::from(StorageError::Database(sqlx::Error::PoolTimedOut));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_permanent_failures_are_not_retryable() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!SyncError::from(StorageError::Decode("k".to_string(), decode)).is_retryable());
        assert!(!SyncError::from(StateError::UnknownSection("x".to_string())).is_retryable());
        assert!(!SyncError::AckBelowPushed {
            seq_num: 1,
            pushed_seq_num: 2
        }
        .is_retryable());
    }
}
