//! MemoryConnector: the persistence boundary between flow lifecycle events
//! and storage. Captures state snapshots, per-method results, errors, and
//! config, and supports querying and bounded retention over all of them.
//!
//! - `item`: `FlowMemoryItem`, the typed record shape this crate persists.
//! - `backend`: the `MemoryBackend` trait plus the in-memory (default) and
//!   sled (feature `sled-backend`) implementations.
//! - `connector`: `MemoryConnector`, the public API — subscribe a flow,
//!   persist typed records, query history, clear data.
//! - `config`: environment-driven tuning (cache TTL, debounce, snapshot caps).
//! - `errors`: the crate's error taxonomy.

pub mod backend;
pub mod config;
pub mod connector;
pub mod errors;
pub mod item;

pub use backend::{InMemoryBackend, MemoryBackend, MemoryQuery};
pub use config::MemoryConfig;
pub use connector::{FlowStateStatus, MemoryConnector};
pub use errors::MemoryError;
pub use item::{FlowMemoryItem, MemoryType};

#[cfg(feature = "sled-backend")]
pub use backend::SledBackend;
