use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetentionError {
    #[error("reference `{0}` not found")]
    ReferenceNotFound(String),

    #[error("reference `{0}` already registered")]
    DuplicateReference(String),
}
