use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied on {0}")]
    PermissionDenied(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
