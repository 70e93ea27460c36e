/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key that must be a content hash did not parse as one.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the embedded database backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// The store was closed and can no longer be used.
    #[error("store is closed")]
    Closed,
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
