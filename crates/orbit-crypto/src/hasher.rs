use orbit_types::Hash;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"orbit-entry-v2"`) that is
/// prepended to every hash computation, so an entry and a manifest with
/// identical bytes produce different hashes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for log entries.
    pub const ENTRY: Self = Self {
        domain: "orbit-entry-v2",
    };
    /// Hasher for identities.
    pub const IDENTITY: Self = Self {
        domain: "orbit-identity-v1",
    };
    /// Hasher for database manifests.
    pub const MANIFEST: Self = Self {
        domain: "orbit-manifest-v1",
    };
    /// Hasher for access controller manifests.
    pub const ACCESS: Self = Self {
        domain: "orbit-access-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Hash::from_hash(*hasher.finalize().as_bytes())
    }

    /// Encode `value` canonically and hash the encoding.
    ///
    /// Returns both the hash and the encoded bytes.
    pub fn hash_cbor<T: serde::Serialize>(&self, value: &T) -> Result<(Hash, Vec<u8>), HasherError> {
        let bytes = encode_canonical(value)?;
        Ok((self.hash(&bytes), bytes))
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &Hash) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Canonical CBOR encoding of a serializable value.
///
/// Struct fields are emitted in declaration order and `serde_json::Value`
/// maps are ordered by key, so equal values always encode to equal bytes.
pub fn encode_canonical<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, HasherError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| HasherError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
