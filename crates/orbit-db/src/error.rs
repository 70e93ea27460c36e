use orbit_types::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("log error: {0}")]
    Log(#[from] orbit_log::LogError),

    #[error("sync error: {0}")]
    Sync(#[from] orbit_sync::SyncError),

    #[error("store error: {0}")]
    Store(#[from] orbit_store::StoreError),

    #[error("identity error: {0}")]
    Identity(#[from] orbit_identity::IdentityError),

    #[error("invalid address: {0}")]
    Address(#[from] orbit_types::TypeError),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown database type: {0}")]
    UnknownDatabaseType(String),

    #[error("unknown access controller: {0}")]
    UnknownAccessController(String),

    #[error("manifest not found: {0}")]
    ManifestNotFound(Hash),

    #[error("block {hash} is corrupt: {reason}")]
    CorruptBlock { hash: Hash, reason: String },

    #[error("database is {actual}, not {expected}")]
    TypeMismatch { expected: String, actual: String },

    #[error("document is missing the index field {0}")]
    MissingKey(String),

    #[error("no entry with key {0}")]
    NoEntry(String),

    #[error("database is closed")]
    Closed,
}

impl From<orbit_crypto::HasherError> for DbError {
    fn from(e: orbit_crypto::HasherError) -> Self {
        DbError::Encoding(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
