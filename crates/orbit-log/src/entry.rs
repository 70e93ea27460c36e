use std::fmt;

use orbit_crypto::{encode_canonical, ContentHasher};
use orbit_identity::{Identities, Identity};
use orbit_types::{Clock, Hash};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};

/// Entry format version written by this crate.
pub const ENTRY_VERSION: u32 = 2;

/// Bound for values carried in an entry.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// The signed and hashed part of an entry. Field order is part of the hash.
#[derive(Serialize)]
struct UnsignedEntry<'a, T> {
    id: &'a str,
    payload: &'a T,
    next: &'a [Hash],
    refs: &'a [Hash],
    clock: &'a Clock,
    v: u32,
}

/// Transport form of an entry.
#[derive(Serialize)]
struct SignedEntry<'a, T> {
    id: &'a str,
    payload: &'a T,
    next: &'a [Hash],
    refs: &'a [Hash],
    clock: &'a Clock,
    v: u32,
    key: &'a str,
    identity: &'a Hash,
    sig: &'a str,
}

#[derive(Deserialize)]
struct DecodedEntry<T> {
    id: String,
    payload: T,
    next: Vec<Hash>,
    refs: Vec<Hash>,
    clock: Clock,
    v: u32,
    key: String,
    identity: Hash,
    sig: String,
}

/// An immutable, signed unit of the log.
///
/// `hash` identifies the canonical encoding of `{id, payload, next, refs,
/// clock, v}`; `sig` is the writer's signature over that same encoding.
/// `bytes` is the full signed encoding used for storage and transport.
#[derive(Clone)]
pub struct Entry<T> {
    /// Id of the log this entry belongs to.
    pub id: String,
    pub payload: T,
    /// Direct predecessors.
    pub next: Vec<Hash>,
    /// Further ancestors, a skip list for faster traversal.
    pub refs: Vec<Hash>,
    pub clock: Clock,
    pub v: u32,
    /// Writer's public key (hex).
    pub key: String,
    /// Hash of the writer's identity.
    pub identity: Hash,
    /// Signature (hex) over the unsigned encoding.
    pub sig: String,
    pub hash: Hash,
    pub bytes: Vec<u8>,
}

impl<T: Payload> Entry<T> {
    /// Build and sign a new entry.
    ///
    /// Without an explicit clock the entry starts at time zero on the
    /// identity's public key.
    pub fn create(
        identities: &Identities,
        identity: &Identity,
        log_id: &str,
        payload: T,
        clock: Option<Clock>,
        next: Vec<Hash>,
        refs: Vec<Hash>,
    ) -> LogResult<Self> {
        if log_id.is_empty() {
            return Err(LogError::Validation("entry requires a log id".into()));
        }
        if !identity.is_identity() {
            return Err(LogError::Validation(format!(
                "entry requires a valid identity, got {}",
                identity.hash
            )));
        }
        let clock = clock.unwrap_or_else(|| Clock::new(identity.public_key.clone(), 0));

        let unsigned = encode_canonical(&UnsignedEntry {
            id: log_id,
            payload: &payload,
            next: &next,
            refs: &refs,
            clock: &clock,
            v: ENTRY_VERSION,
        })
        .map_err(|e| LogError::Validation(format!("payload cannot be encoded: {e}")))?;
        let hash = ContentHasher::ENTRY.hash(&unsigned);
        let sig = identities.sign(identity, &unsigned)?;

        let bytes = encode_canonical(&SignedEntry {
            id: log_id,
            payload: &payload,
            next: &next,
            refs: &refs,
            clock: &clock,
            v: ENTRY_VERSION,
            key: &identity.public_key,
            identity: &identity.hash,
            sig: &sig,
        })
        .map_err(|e| LogError::Encoding(e.to_string()))?;

        Ok(Self {
            id: log_id.to_string(),
            payload,
            next,
            refs,
            clock,
            v: ENTRY_VERSION,
            key: identity.public_key.clone(),
            identity: identity.hash,
            sig,
            hash,
            bytes,
        })
    }

    /// Decode an entry from its signed bytes. The hash is recomputed, never
    /// trusted.
    pub fn decode(bytes: &[u8]) -> LogResult<Self> {
        let decoded: DecodedEntry<T> =
            ciborium::from_reader(bytes).map_err(|e| LogError::Encoding(e.to_string()))?;
        if decoded.v != ENTRY_VERSION {
            return Err(LogError::UnsupportedVersion(decoded.v));
        }
        let mut entry = Self {
            id: decoded.id,
            payload: decoded.payload,
            next: decoded.next,
            refs: decoded.refs,
            clock: decoded.clock,
            v: decoded.v,
            key: decoded.key,
            identity: decoded.identity,
            sig: decoded.sig,
            hash: Hash::from_hash([0; 32]),
            bytes: bytes.to_vec(),
        };
        entry.hash = ContentHasher::ENTRY.hash(&entry.unsigned_bytes()?);
        Ok(entry)
    }

    /// The signed transport bytes.
    pub fn encode(&self) -> &[u8] {
        &self.bytes
    }

    /// Check the signature against the entry's key and that the hash still
    /// matches the content.
    pub fn verify(&self, identities: &Identities) -> LogResult<bool> {
        let unsigned = self.unsigned_bytes()?;
        if !ContentHasher::ENTRY.verify(&unsigned, &self.hash) {
            return Ok(false);
        }
        Ok(identities.verify(&self.sig, &self.key, &unsigned))
    }

    fn unsigned_bytes(&self) -> LogResult<Vec<u8>> {
        encode_canonical(&UnsignedEntry {
            id: &self.id,
            payload: &self.payload,
            next: &self.next,
            refs: &self.refs,
            clock: &self.clock,
            v: self.v,
        })
        .map_err(|e| LogError::Encoding(e.to_string()))
    }
}

impl<T> Entry<T> {
    pub fn is_equal(a: &Entry<T>, b: &Entry<T>) -> bool {
        a.hash == b.hash
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<T> Eq for Entry<T> {}

impl<T: fmt::Debug> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("hash", &self.hash)
            .field("clock", &self.clock)
            .field("next", &self.next)
            .field("payload", &self.payload)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_identity::ProviderType;
    use serde_json::{json, Value};

    fn setup() -> (Identities, Identity) {
        let identities = Identities::in_memory();
        let identity = identities
            .create_identity("userA", ProviderType::PublicKey)
            .unwrap();
        (identities, identity)
    }

    #[test]
    fn create_sets_defaults() {
        let (identities, identity) = setup();
        let entry =
            Entry::create(&identities, &identity, "A", json!("hello"), None, vec![], vec![]).unwrap();
        assert_eq!(entry.id, "A");
        assert_eq!(entry.v, ENTRY_VERSION);
        assert_eq!(entry.clock, Clock::new(identity.public_key.clone(), 0));
        assert_eq!(entry.key, identity.public_key);
        assert_eq!(entry.identity, identity.hash);
        assert!(entry.verify(&identities).unwrap());
    }

    #[test]
    fn decode_recomputes_hash() {
        let (identities, identity) = setup();
        let first =
            Entry::create(&identities, &identity, "A", json!({"n": 1}), None, vec![], vec![]).unwrap();
        let second = Entry::create(
            &identities,
            &identity,
            "A",
            json!({"n": 2}),
            Some(first.clock.tick()),
            vec![first.hash],
            vec![],
        )
        .unwrap();
        let decoded: Entry<Value> = Entry::decode(&second.bytes).unwrap();
        assert_eq!(decoded.hash, second.hash);
        assert_eq!(decoded.next, vec![first.hash]);
        assert_eq!(decoded.payload, json!({"n": 2}));
        assert!(decoded.verify(&identities).unwrap());
    }

    #[test]
    fn hash_excludes_signature() {
        let (identities, identity) = setup();
        let entry =
            Entry::create(&identities, &identity, "A", json!("x"), None, vec![], vec![]).unwrap();
        let mut tampered = entry.clone();
        tampered.sig = "00".repeat(64);
        assert_eq!(tampered.hash, entry.hash);
        assert!(!tampered.verify(&identities).unwrap());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let (identities, identity) = setup();
        let mut entry =
            Entry::create(&identities, &identity, "A", json!("x"), None, vec![], vec![]).unwrap();
        entry.payload = json!("y");
        assert!(!entry.verify(&identities).unwrap());
    }

    #[test]
    fn empty_log_id_is_rejected() {
        let (identities, identity) = setup();
        let err = Entry::create(&identities, &identity, "", json!(1), None, vec![], vec![])
            .unwrap_err();
        assert!(matches!(err, LogError::Validation(_)));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let (identities, identity) = setup();
        let entry =
            Entry::create(&identities, &identity, "A", json!(1), None, vec![], vec![]).unwrap();
        let bytes = encode_canonical(&SignedEntry {
            id: &entry.id,
            payload: &entry.payload,
            next: &entry.next,
            refs: &entry.refs,
            clock: &entry.clock,
            v: 1,
            key: &entry.key,
            identity: &entry.identity,
            sig: &entry.sig,
        })
        .unwrap();
        assert!(matches!(
            Entry::<Value>::decode(&bytes),
            Err(LogError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(Entry::<Value>::decode(b"\xff\x00garbage").is_err());
    }

    #[test]
    fn equality_is_by_hash() {
        let (identities, identity) = setup();
        let a = Entry::create(&identities, &identity, "A", json!(1), None, vec![], vec![]).unwrap();
        let b = Entry::create(&identities, &identity, "A", json!(2), None, vec![], vec![]).unwrap();
        assert!(Entry::is_equal(&a, &a.clone()));
        assert!(!Entry::is_equal(&a, &b));
    }
}
