//! Versioned session state: schema, staging area and commit queue.

pub mod schema;
pub mod tree;
pub mod versioned;

pub use schema::{Schema, ITEM_DETAILS, SEARCH_RESULTS};
pub use tree::{deep_merge, fold, merged};
pub use versioned::{CommittedEntry, VersionedStateManager};

/// Errors raised by state mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The section is not part of the session schema.
    UnknownSection(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::UnknownSection(section) => {
                write!(f, "Unknown schema section: {}", section)
            }
        }
    }
}

impl std::error::Error for StateError {}
