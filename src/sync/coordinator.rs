//! Per-session synchronization façade.

use serde_json::{Map, Value};
use std::sync::Arc;

use super::session::{SessionRecord, SyncPayload};
use super::SyncError;
use crate::server::storage::{session_key, SessionBackend};
use crate::state::{CommittedEntry, Schema, ITEM_DETAILS, SEARCH_RESULTS};

pub const DEFAULT_KEY_PREFIX: &str = "clientsync";
pub const DEFAULT_MAX_RETRIES: usize = 8;

const MAX_SESSION_ID_LEN: usize = 128;

/// Coordinates staging, commits, diffs and acknowledgments for one session.
///
/// All state lives in the backend as a single record; the coordinator holds
/// no session data of its own, so any number of coordinators (in any number
/// of processes) may serve the same session concurrently. Every mutation is
/// an optimistic read-modify-write that is re-applied when another writer
/// got in first.
pub struct SyncCoordinator {
    backend: Arc<dyn SessionBackend>,
    schema: Arc<Schema>,
    session_id: String,
    key: String,
    max_retries: usize,
}

impl SyncCoordinator {
    /// Creates a coordinator for `session_id`.
    ///
    /// The session itself is created lazily on first access.
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        schema: Arc<Schema>,
        session_id: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let session_id = session_id.into();
        Self::validate_session_id(&session_id)?;

        Ok(Self {
            backend,
            schema,
            key: session_key(DEFAULT_KEY_PREFIX, &session_id),
            session_id,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key = session_key(prefix, &self.session_id);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Session IDs become part of a `:`-separated storage key.
    fn validate_session_id(session_id: &str) -> Result<(), SyncError> {
        if session_id.is_empty()
            || session_id.len() > MAX_SESSION_ID_LEN
            || session_id.contains(':')
            || session_id.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(SyncError::InvalidSessionId(session_id.to_string()));
        }
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Stages `{section: {key: value}}`.
    pub async fn stage(&self, section: &str, key: &str, value: Value) -> Result<(), SyncError> {
        self.update("stage", |record| {
            record
                .versions
                .stage(&self.schema, section, key, value.clone())
                .map_err(SyncError::from)
        })
        .await
    }

    /// Stages the results list for a search query.
    pub async fn add_search_results(
        &self,
        query: &str,
        results: Vec<Value>,
    ) -> Result<(), SyncError> {
        self.stage(SEARCH_RESULTS, query, Value::Array(results))
            .await
    }

    /// Stages the detail map for an item.
    pub async fn add_item_details(
        &self,
        item_id: &str,
        details: Map<String, Value>,
    ) -> Result<(), SyncError> {
        self.stage(ITEM_DETAILS, item_id, Value::Object(details))
            .await
    }

    /// Commits staged changes. Returns the new sequence number, or `None`
    /// when nothing was staged.
    pub async fn commit(&self) -> Result<Option<u64>, SyncError> {
        let seq_num = self
            .update("commit", |record| Ok(record.versions.commit()))
            .await?;

        if let Some(seq_num) = seq_num {
            tracing::info!("Session {} committed seq {}", self.session_id, seq_num);
        }
        Ok(seq_num)
    }

    /// Records that the client holds the state as of `seq_num`.
    pub async fn acknowledge(&self, seq_num: u64) -> Result<(), SyncError> {
        let advanced = self
            .update("acknowledge", |record| record.acknowledge(seq_num))
            .await?;

        if advanced {
            tracing::info!("Session {} acknowledged seq {}", self.session_id, seq_num);
        }
        Ok(())
    }

    /// Drops the whole session; the next access starts from scratch.
    pub async fn clear(&self) -> Result<bool, SyncError> {
        let existed = self.backend.delete(&self.key).await?;
        tracing::info!("Session {} cleared", self.session_id);
        Ok(existed)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Payload bringing the client from its acknowledged state to the
    /// current one; `None` when it is already up to date.
    pub async fn calculate_diff(&self) -> Result<Option<SyncPayload>, SyncError> {
        let payload = self.snapshot().await?.calculate_diff()?;

        match &payload {
            Some(p) => tracing::debug!(
                "Session {} diff to seq {}: {} bytes",
                self.session_id,
                p.seq_num,
                p.diff.as_ref().map(|d| d.len()).unwrap_or(0)
            ),
            None => tracing::debug!("Session {} is up to date", self.session_id),
        }
        Ok(payload)
    }

    pub async fn get_pending(&self) -> Result<Vec<CommittedEntry>, SyncError> {
        Ok(self.snapshot().await?.versions.peek_pending().to_vec())
    }

    pub async fn get_staged(&self) -> Result<Map<String, Value>, SyncError> {
        Ok(self.snapshot().await?.versions.staged().clone())
    }

    pub async fn get_pushed_data(&self) -> Result<Value, SyncError> {
        Ok(self.snapshot().await?.baseline.pushed_snapshot)
    }

    pub async fn get_pushed_seq_num(&self) -> Result<u64, SyncError> {
        Ok(self.snapshot().await?.baseline.pushed_seq_num)
    }

    /// Acknowledged state with every pending commit applied.
    pub async fn effective_state(&self) -> Result<Value, SyncError> {
        Ok(self.snapshot().await?.effective_state())
    }

    /// A consistent copy of the whole session record, creating the session
    /// if this is its first access.
    pub async fn snapshot(&self) -> Result<SessionRecord, SyncError> {
        self.update("snapshot", |record| Ok(record.clone())).await
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn load(&self) -> Result<(Option<u64>, SessionRecord), SyncError> {
        match self.backend.get(&self.key).await? {
            Some(stored) => {
                let record = serde_json::from_value(stored.value).map_err(|source| {
                    SyncError::CorruptRecord {
                        key: self.key.clone(),
                        source,
                    }
                })?;
                Ok((Some(stored.version), record))
            }
            None => Ok((None, SessionRecord::new(&self.schema))),
        }
    }

    /// Applies `apply` to the current record and writes the result back if
    /// nobody else wrote in between, re-reading and re-applying otherwise.
    ///
    /// An error from `apply` aborts without writing. A record that `apply`
    /// leaves unchanged is not rewritten, unless it did not exist yet.
    async fn update<T>(
        &self,
        op: &str,
        mut apply: impl FnMut(&mut SessionRecord) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        for attempt in 1..=self.max_retries {
            let (version, original) = self.load().await?;
            let mut record = original.clone();
            let out = apply(&mut record)?;

            if version.is_some() && record == original {
                return Ok(out);
            }

            let value = serde_json::to_value(&record).map_err(SyncError::Encode)?;
            if self
                .backend
                .compare_and_set(&self.key, version, &value)
                .await?
            {
                if version.is_none() {
                    tracing::info!("Session {} initialized", self.session_id);
                }
                tracing::debug!("{} on {} written (attempt {})", op, self.key, attempt);
                return Ok(out);
            }

            tracing::warn!(
                "Concurrent update of {} during {}, retrying ({}/{})",
                self.key,
                op,
                attempt,
                self.max_retries
            );
        }

        Err(SyncError::Contention {
            key: self.key.clone(),
            attempts: self.max_retries,
        })
    }
}
