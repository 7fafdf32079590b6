//! Server-side modules for the client sync server.

pub mod routes;
pub mod storage;

pub use routes::{router, ApiError, AppState};
pub use storage::{open_backend, MemoryStorage, SessionBackend, StorageError, StoredValue};
