//! Staged mutations and the queue of sequence-numbered commits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::Schema;
use super::tree::deep_merge;
use super::StateError;

/// One committed delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedEntry {
    pub seq_num: u64,
    pub data: Value,
}

/// Staging area plus committed queue for one session.
///
/// The queue is ordered by `seq_num` with no gaps. `head_seq_num` is the
/// last number handed out; it is persisted with the queue and survives
/// pruning, so numbers never repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedStateManager {
    staged: Map<String, Value>,
    committed: Vec<CommittedEntry>,
    head_seq_num: u64,
}

impl VersionedStateManager {
    /// Fresh state: nothing staged, commit 1 holding the full defaults.
    pub fn initialize(schema: &Schema) -> Self {
        Self {
            staged: Map::new(),
            committed: vec![CommittedEntry {
                seq_num: 1,
                data: schema.defaults(),
            }],
            head_seq_num: 1,
        }
    }

    /// Deep-merges `{section: {key: value}}` into the staging area.
    pub fn stage(
        &mut self,
        schema: &Schema,
        section: &str,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), StateError> {
        if !schema.contains(section) {
            return Err(StateError::UnknownSection(section.to_string()));
        }

        let mut patch = Map::new();
        patch.insert(key.into(), value);

        let slot = self
            .staged
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        deep_merge(slot, Value::Object(patch));

        Ok(())
    }

    /// Moves everything staged into a new commit.
    ///
    /// Returns the new sequence number, or `None` if nothing was staged.
    pub fn commit(&mut self) -> Option<u64> {
        if self.staged.is_empty() {
            return None;
        }

        self.head_seq_num += 1;
        let data = Value::Object(std::mem::take(&mut self.staged));
        self.committed.push(CommittedEntry {
            seq_num: self.head_seq_num,
            data,
        });

        Some(self.head_seq_num)
    }

    /// Committed entries not yet pruned, oldest first.
    pub fn peek_pending(&self) -> &[CommittedEntry] {
        &self.committed
    }

    /// The leading entries with `seq_num <= up_to`.
    pub fn pending_up_to(&self, up_to: u64) -> &[CommittedEntry] {
        let end = self.committed.partition_point(|e| e.seq_num <= up_to);
        &self.committed[..end]
    }

    /// Drops every entry with `seq_num <= up_to`.
    ///
    /// Callers must have folded those entries somewhere first.
    pub fn prune(&mut self, up_to: u64) {
        self.committed.retain(|e| e.seq_num > up_to);
    }

    pub fn staged(&self) -> &Map<String, Value> {
        &self.staged
    }

    pub fn head_seq_num(&self) -> u64 {
        self.head_seq_num
    }
}
