use orbit_crypto::{HasherError, SignatureError};
use orbit_store::StoreError;

/// Errors from identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("identity provider type {0:?} is not supported")]
    UnknownProvider(String),

    #[error("no signing key named {0:?} in keystore")]
    KeyNotFound(String),
}

impl From<HasherError> for IdentityError {
    fn from(e: HasherError) -> Self {
        IdentityError::Encoding(e.to_string())
    }
}

/// Result alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
