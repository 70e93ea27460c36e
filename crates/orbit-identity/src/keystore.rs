use std::sync::Arc;

use orbit_crypto::SigningKey;
use orbit_store::{MemoryStorage, Storage};
use tracing::debug;

use crate::error::IdentityResult;

/// Named Ed25519 signing keys persisted in a [`Storage`].
///
/// Keys are stored as their raw 32-byte secret under the key's name.
pub struct Keystore {
    storage: Arc<dyn Storage>,
}

impl Keystore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// A keystore that forgets its keys when dropped.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn has_key(&self, id: &str) -> IdentityResult<bool> {
        Ok(self.storage.contains(id)?)
    }

    /// Store an existing key under `id`, replacing any previous one.
    pub fn add_key(&self, id: &str, key: &SigningKey) -> IdentityResult<()> {
        self.storage.put(id, key.secret())?;
        Ok(())
    }

    /// Generate and store a fresh key under `id`.
    pub fn create_key(&self, id: &str) -> IdentityResult<SigningKey> {
        let key = SigningKey::generate();
        self.add_key(id, &key)?;
        debug!(key_id = id, public_key = %key.public_key().to_string(), "created signing key");
        Ok(key)
    }

    pub fn get_key(&self, id: &str) -> IdentityResult<Option<SigningKey>> {
        match self.storage.get(id)? {
            Some(bytes) => Ok(Some(SigningKey::from_secret(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch the key named `id`, creating it on first use.
    pub fn get_or_create_key(&self, id: &str) -> IdentityResult<SigningKey> {
        match self.get_key(id)? {
            Some(key) => Ok(key),
            None => self.create_key(id),
        }
    }

    /// Sign `data`, returning the hex signature.
    pub fn sign(key: &SigningKey, data: &[u8]) -> String {
        key.sign(data).to_string()
    }

    /// Check a hex signature against a hex public key. Malformed inputs
    /// verify as `false`.
    pub fn verify(signature: &str, public_key: &str, data: &[u8]) -> bool {
        orbit_crypto::verify_hex(public_key, signature, data)
    }

    pub fn clear(&self) -> IdentityResult<()> {
        Ok(self.storage.clear()?)
    }

    pub fn close(&self) -> IdentityResult<()> {
        Ok(self.storage.close()?)
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keystore(<redacted>)")
    }
}
