use orbit_identity::IdentityError;
use orbit_store::StoreError;
use orbit_types::Hash;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Input rejected before anything was written.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("could not append entry: key {identity} is not allowed to write to the log")]
    NotAllowed { identity: Hash },

    #[error("entry's log id {actual:?} doesn't match the log's id {expected:?}")]
    LogIdMismatch { expected: String, actual: String },

    #[error("could not validate signature for entry {0}")]
    InvalidSignature(Hash),

    /// An ancestor needed to complete a join is not in entry storage.
    #[error("entry {0} is not available")]
    MissingEntry(Hash),

    /// A comparator returned `Equal` for two distinct entries.
    #[error("comparator returned equal for distinct entries {a} and {b}")]
    ZeroComparison { a: Hash, b: Hash },

    #[error("unsupported entry version {0}")]
    UnsupportedVersion(u32),

    #[error("stored entry {hash} is corrupt: {reason}")]
    Corrupt { hash: Hash, reason: String },

    /// An access controller failed while deciding.
    #[error("access controller error: {0}")]
    Access(String),
}

/// Convenience alias for log results.
pub type LogResult<T> = Result<T, LogError>;
