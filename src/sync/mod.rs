//! Server-to-client state synchronization.
//!
//! The server accumulates data for a client in two schema sections, commits
//! it in numbered batches, and ships each batch as a text delta against the
//! state the client last acknowledged.
//!
//! # Flow
//!
//! ```text
//! stage ─► commit ─► calculate_diff ─► (client merges) ─► acknowledge
//! ```
//!
//! A [`SessionHub`] hands out [`SyncCoordinator`]s; every coordinator reads
//! and writes the session record through the shared backend, so the hub can
//! be cloned into any number of request handlers.

pub mod coordinator;
pub mod error;
pub mod serialize;
pub mod session;

pub use coordinator::{SyncCoordinator, DEFAULT_KEY_PREFIX, DEFAULT_MAX_RETRIES};
pub use error::SyncError;
pub use serialize::serialize;
pub use session::{AckBaseline, SessionRecord, SyncPayload};

use std::sync::Arc;

use crate::config::Config;
use crate::server::storage::SessionBackend;
use crate::state::Schema;

/// Creates coordinators that share one backend and schema.
#[derive(Clone)]
pub struct SessionHub {
    backend: Arc<dyn SessionBackend>,
    schema: Arc<Schema>,
    key_prefix: String,
    max_retries: usize,
}

impl SessionHub {
    pub fn new(backend: Arc<dyn SessionBackend>, schema: Schema) -> Self {
        Self {
            backend,
            schema: Arc::new(schema),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Hub using the key prefix and retry budget from `config`.
    pub fn from_config(backend: Arc<dyn SessionBackend>, schema: Schema, config: &Config) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            max_retries: config.max_commit_retries.max(1),
            ..Self::new(backend, schema)
        }
    }

    /// Coordinator for one session.
    pub fn session(&self, session_id: &str) -> Result<SyncCoordinator, SyncError> {
        Ok(
            SyncCoordinator::new(self.backend.clone(), self.schema.clone(), session_id)?
                .with_key_prefix(&self.key_prefix)
                .with_max_retries(self.max_retries),
        )
    }

    /// Removes sessions whose time-to-live has elapsed.
    pub async fn purge_expired(&self) -> Result<u64, SyncError> {
        let purged = self.backend.purge_expired().await?;
        if purged > 0 {
            tracing::info!("Purged {} expired session(s)", purged);
        }
        Ok(purged)
    }
}
