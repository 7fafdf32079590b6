//! The persisted per-session record and the pure operations on it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::serialize::serialize;
use super::SyncError;
use crate::delta::{self, DeltaError};
use crate::state::{deep_merge, fold, Schema, VersionedStateManager};

/// The state the client is assumed to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckBaseline {
    pub pushed_seq_num: u64,
    pub pushed_snapshot: Value,
}

impl Default for AckBaseline {
    fn default() -> Self {
        Self {
            pushed_seq_num: 0,
            pushed_snapshot: Value::Object(Map::new()),
        }
    }
}

/// What gets sent to the client.
///
/// `diff` is `None` when the pending commits leave the serialized state
/// unchanged; the client still acknowledges `seq_num` so the log drains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub diff: Option<String>,
    pub seq_num: u64,
}

impl SyncPayload {
    /// Client side: rebuilds the new serialized state from the old one.
    pub fn apply(&self, serialized_baseline: &str) -> Result<String, DeltaError> {
        match &self.diff {
            Some(d) => delta::merge(serialized_baseline, d),
            None => Ok(serialized_baseline.to_string()),
        }
    }
}

/// Everything stored for one session, written as a single record so that
/// each operation is one atomic read-modify-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub versions: VersionedStateManager,
    pub baseline: AckBaseline,
}

impl SessionRecord {
    pub fn new(schema: &Schema) -> Self {
        Self {
            versions: VersionedStateManager::initialize(schema),
            baseline: AckBaseline::default(),
        }
    }

    /// Baseline with every pending commit applied.
    pub fn effective_state(&self) -> Value {
        let mut state = self.baseline.pushed_snapshot.clone();
        deep_merge(&mut state, fold(self.versions.peek_pending()));
        state
    }

    /// Delta from the acknowledged baseline to the effective state.
    ///
    /// `None` when nothing is pending.
    pub fn calculate_diff(&self) -> Result<Option<SyncPayload>, SyncError> {
        let Some(last) = self.versions.peek_pending().last() else {
            return Ok(None);
        };

        let original = serialize(&self.baseline.pushed_snapshot).map_err(SyncError::Encode)?;
        let target = serialize(&self.effective_state()).map_err(SyncError::Encode)?;

        Ok(Some(SyncPayload {
            diff: delta::diff(&original, &target),
            seq_num: last.seq_num,
        }))
    }

    /// Folds commits up to `seq_num` into the baseline and prunes them.
    ///
    /// Re-acknowledging the current baseline is a no-op. Returns whether
    /// anything changed.
    pub fn acknowledge(&mut self, seq_num: u64) -> Result<bool, SyncError> {
        let pushed_seq_num = self.baseline.pushed_seq_num;
        if seq_num < pushed_seq_num {
            return Err(SyncError::AckBelowPushed {
                seq_num,
                pushed_seq_num,
            });
        }
        if seq_num == pushed_seq_num {
            return Ok(false);
        }

        let head_seq_num = self
            .versions
            .peek_pending()
            .last()
            .map(|e| e.seq_num)
            .unwrap_or(pushed_seq_num);
        if seq_num > head_seq_num {
            return Err(SyncError::AckBeyondPending {
                seq_num,
                head_seq_num,
            });
        }

        let folded = fold(self.versions.pending_up_to(seq_num));
        deep_merge(&mut self.baseline.pushed_snapshot, folded);
        self.baseline.pushed_seq_num = seq_num;
        self.versions.prune(seq_num);

        Ok(true)
    }
}
