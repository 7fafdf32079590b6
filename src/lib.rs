//! Incremental, delta-based synchronization of server-held JSON state to
//! clients.
//!
//! - [`delta`]: text diff/merge codec
//! - [`state`]: schema, staging and committed history
//! - [`sync`]: per-session coordination and acknowledgments
//! - [`server`]: storage backends and the HTTP surface

pub mod config;
pub mod db;
pub mod delta;
pub mod server;
pub mod state;
pub mod sync;
