//! Error taxonomy for the memory/persistence boundary, mirroring the split
//! `chem-persistence::error::PersistenceError` draws between not-found,
//! transient I/O, and serialization faults — minus the relational-backend
//! variants that split drops (see DESIGN.md).

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("no memory found for flow `{0}`")]
    NotFound(Uuid),

    #[error("backend I/O error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("semantic search requested without a configured vector retriever")]
    UnsupportedQuery,
}
