use std::fmt;

use orbit_crypto::ContentHasher;
use orbit_types::Hash;
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, IdentityResult};

/// The two signatures that bind an identity together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySignatures {
    /// Identity key's signature over `id`.
    pub id: String,
    /// Provider's signature over `public_key + signatures.id`.
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// Encoded form of an identity. Field order is part of the hash.
#[derive(Serialize, Deserialize)]
struct IdentityContent {
    id: String,
    #[serde(rename = "publicKey")]
    public_key: String,
    signatures: IdentitySignatures,
    #[serde(rename = "type")]
    id_type: String,
}

/// A signer of log entries.
///
/// `hash` and `bytes` are derived from the other fields at construction and
/// on decode; two identities are equal iff their hashes are equal.
#[derive(Clone)]
pub struct Identity {
    pub id: String,
    pub id_type: String,
    pub public_key: String,
    pub signatures: IdentitySignatures,
    pub hash: Hash,
    pub bytes: Vec<u8>,
}

impl Identity {
    /// Assemble an identity, encoding it and deriving its hash.
    pub fn new(
        id: impl Into<String>,
        id_type: impl Into<String>,
        public_key: impl Into<String>,
        signatures: IdentitySignatures,
    ) -> IdentityResult<Self> {
        let content = IdentityContent {
            id: id.into(),
            public_key: public_key.into(),
            signatures,
            id_type: id_type.into(),
        };
        Self::from_content(content)
    }

    fn from_content(content: IdentityContent) -> IdentityResult<Self> {
        for (field, value) in [
            ("id", &content.id),
            ("type", &content.id_type),
            ("publicKey", &content.public_key),
            ("signatures.id", &content.signatures.id),
            ("signatures.publicKey", &content.signatures.public_key),
        ] {
            if value.is_empty() {
                return Err(IdentityError::InvalidIdentity(format!("{field} is required")));
            }
        }
        let (hash, bytes) = ContentHasher::IDENTITY.hash_cbor(&content)?;
        Ok(Self {
            id: content.id,
            id_type: content.id_type,
            public_key: content.public_key,
            signatures: content.signatures,
            hash,
            bytes,
        })
    }

    /// Decode an identity from its encoded bytes, recomputing the hash.
    pub fn decode(bytes: &[u8]) -> IdentityResult<Self> {
        let content: IdentityContent =
            ciborium::from_reader(bytes).map_err(|e| IdentityError::Encoding(e.to_string()))?;
        Self::from_content(content)
    }

    /// Returns `true` if every field is present and the hash matches the bytes.
    pub fn is_identity(&self) -> bool {
        !self.id.is_empty()
            && !self.id_type.is_empty()
            && !self.public_key.is_empty()
            && !self.signatures.id.is_empty()
            && !self.signatures.public_key.is_empty()
            && ContentHasher::IDENTITY.verify(&self.bytes, &self.hash)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Identity {}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("type", &self.id_type)
            .field("hash", &self.hash)
            .finish()
    }
}
