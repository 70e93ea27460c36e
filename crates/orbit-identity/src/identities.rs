use std::sync::Arc;

use orbit_store::{LruStorage, MemoryStorage, Storage};
use orbit_types::Hash;
use tracing::{debug, warn};

use crate::error::{IdentityError, IdentityResult};
use crate::identity::{Identity, IdentitySignatures};
use crate::keystore::Keystore;
use crate::provider::{ProviderRegistry, ProviderType};

/// Capacity of the default verified-identity cache.
const VERIFIED_CACHE_CAPACITY: usize = 1000;

/// Creates, stores, and verifies identities.
///
/// Identities are persisted by hash in `storage`. Successful provider
/// verifications are remembered in `verified`, keyed by identity id, so a
/// writer's provider signature is checked once per process. The cache may
/// be shared between many `Identities` instances.
pub struct Identities {
    keystore: Arc<Keystore>,
    storage: Arc<dyn Storage>,
    verified: Arc<dyn Storage>,
    providers: Arc<ProviderRegistry>,
}

impl Identities {
    pub fn new(
        keystore: Arc<Keystore>,
        storage: Arc<dyn Storage>,
        verified: Arc<dyn Storage>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            keystore,
            storage,
            verified,
            providers,
        }
    }

    /// Everything in memory with the default providers.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(Keystore::in_memory()),
            Arc::new(MemoryStorage::new()),
            Arc::new(LruStorage::new(VERIFIED_CACHE_CAPACITY)),
            Arc::new(ProviderRegistry::with_defaults()),
        )
    }

    pub fn keystore(&self) -> &Arc<Keystore> {
        &self.keystore
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Create (or recreate) the identity for the keystore key named `id`.
    ///
    /// The same `id` on the same keystore always yields the same identity.
    pub fn create_identity(&self, id: &str, provider_type: ProviderType) -> IdentityResult<Identity> {
        let provider = self.providers.get(provider_type)?;
        let provider_id = provider.get_id(&self.keystore, id)?;

        let identity_key = self.keystore.get_or_create_key(&provider_id)?;
        let public_key = identity_key.public_key().to_string();
        let id_signature = Keystore::sign(&identity_key, provider_id.as_bytes());

        let data = format!("{public_key}{id_signature}");
        let public_key_signature = provider.sign_identity(&self.keystore, data.as_bytes(), id)?;

        let identity = Identity::new(
            provider_id,
            provider_type.as_str(),
            public_key,
            IdentitySignatures {
                id: id_signature,
                public_key: public_key_signature,
            },
        )?;
        self.add_identity(&identity)?;
        debug!(identity = %identity.hash.short_hex(), provider = %provider_type, "created identity");
        Ok(identity)
    }

    /// Persist an identity received from elsewhere.
    pub fn add_identity(&self, identity: &Identity) -> IdentityResult<()> {
        self.storage.put(&identity.hash.to_string(), &identity.bytes)?;
        Ok(())
    }

    /// Fetch an identity by hash. The decoded hash must match the key.
    pub fn get_identity(&self, hash: &Hash) -> IdentityResult<Option<Identity>> {
        let Some(bytes) = self.storage.get(&hash.to_string())? else {
            return Ok(None);
        };
        let identity = Identity::decode(&bytes)?;
        if identity.hash != *hash {
            return Err(IdentityError::InvalidIdentity(format!(
                "stored identity hashes to {} not {}",
                identity.hash, hash
            )));
        }
        Ok(Some(identity))
    }

    /// Check both signatures of an identity.
    ///
    /// The id signature is always checked. The provider signature is checked
    /// once per id and public key, then served from the verified cache.
    pub fn verify_identity(&self, identity: &Identity) -> IdentityResult<bool> {
        if !identity.is_identity() {
            return Ok(false);
        }
        if !Keystore::verify(
            &identity.signatures.id,
            &identity.public_key,
            identity.id.as_bytes(),
        ) {
            warn!(identity = %identity.hash.short_hex(), "identity id signature does not verify");
            return Ok(false);
        }

        if let Some(cached) = self.verified.get(&identity.id)? {
            if cached == identity.public_key.as_bytes() {
                return Ok(true);
            }
        }

        let provider = self.providers.get_by_tag(&identity.id_type)?;
        let verified = provider.verify_identity(identity)?;
        if verified {
            self.verified
                .put(&identity.id, identity.public_key.as_bytes())?;
        }
        Ok(verified)
    }

    /// Sign `data` with the identity's own key.
    pub fn sign(&self, identity: &Identity, data: &[u8]) -> IdentityResult<String> {
        let key = self
            .keystore
            .get_key(&identity.id)?
            .ok_or_else(|| IdentityError::KeyNotFound(identity.id.clone()))?;
        Ok(Keystore::sign(&key, data))
    }

    /// Check a hex signature against a hex public key.
    pub fn verify(&self, signature: &str, public_key: &str, data: &[u8]) -> bool {
        Keystore::verify(signature, public_key, data)
    }
}

impl std::fmt::Debug for Identities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identities")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- helpers ----

    fn shared_pair() -> (Identities, Identities) {
        // Two processes' worth of identities sharing one identity store,
        // the way peers share the block store.
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let make = || {
            Identities::new(
                Arc::new(Keystore::in_memory()),
                storage.clone(),
                Arc::new(LruStorage::new(10)),
                Arc::new(ProviderRegistry::with_defaults()),
            )
        };
        (make(), make())
    }

    // ---- creation ----

    #[test]
    fn create_identity_is_deterministic_per_keystore() {
        let identities = Identities::in_memory();
        let a = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        let b = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.id_type, "publickey");
    }

    #[test]
    fn different_names_produce_different_identities() {
        let identities = Identities::in_memory();
        let a = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        let b = identities.create_identity("bob", ProviderType::PublicKey).unwrap();
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn created_identity_is_stored() {
        let identities = Identities::in_memory();
        let identity = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        let loaded = identities.get_identity(&identity.hash).unwrap().unwrap();
        assert_eq!(loaded, identity);
        assert!(identities
            .get_identity(&Hash::from_bytes(b"nobody"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn unregistered_provider_fails() {
        let identities = Identities::new(
            Arc::new(Keystore::in_memory()),
            Arc::new(MemoryStorage::new()),
            Arc::new(LruStorage::new(10)),
            Arc::new(ProviderRegistry::empty()),
        );
        assert!(matches!(
            identities.create_identity("alice", ProviderType::PublicKey),
            Err(IdentityError::UnknownProvider(_))
        ));
    }

    // ---- verification ----

    #[test]
    fn fresh_identity_verifies_on_other_peer() {
        let (ours, theirs) = shared_pair();
        let identity = ours.create_identity("alice", ProviderType::PublicKey).unwrap();
        let fetched = theirs.get_identity(&identity.hash).unwrap().unwrap();
        assert!(theirs.verify_identity(&fetched).unwrap());
        // Served from the cache the second time.
        assert!(theirs.verify_identity(&fetched).unwrap());
    }

    #[test]
    fn forged_id_signature_is_rejected() {
        let identities = Identities::in_memory();
        let real = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        let other = identities.create_identity("mallory", ProviderType::PublicKey).unwrap();
        let forged = Identity::new(
            real.id.clone(),
            real.id_type.clone(),
            other.public_key.clone(),
            real.signatures.clone(),
        )
        .unwrap();
        assert!(!identities.verify_identity(&forged).unwrap());
    }

    #[test]
    fn forged_provider_signature_is_rejected() {
        let identities = Identities::in_memory();
        let real = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        let other = identities.create_identity("mallory", ProviderType::PublicKey).unwrap();
        let forged = Identity::new(
            real.id.clone(),
            real.id_type.clone(),
            real.public_key.clone(),
            IdentitySignatures {
                id: real.signatures.id.clone(),
                public_key: other.signatures.public_key.clone(),
            },
        )
        .unwrap();
        assert!(!Identities::in_memory().verify_identity(&forged).unwrap());
    }

    #[test]
    fn cache_does_not_vouch_for_other_public_key() {
        let identities = Identities::in_memory();
        let real = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        assert!(identities.verify_identity(&real).unwrap());

        // Same id, different key that signs the id itself but lacks the
        // provider's co-signature.
        let rogue_key = identities.keystore().create_key("rogue").unwrap();
        let rogue_pk = rogue_key.public_key().to_string();
        let id_sig = Keystore::sign(&rogue_key, real.id.as_bytes());
        let rogue = Identity::new(
            real.id.clone(),
            "publickey",
            rogue_pk,
            IdentitySignatures {
                id: id_sig,
                public_key: real.signatures.public_key.clone(),
            },
        )
        .unwrap();
        assert!(!identities.verify_identity(&rogue).unwrap());
    }

    // ---- signing ----

    #[test]
    fn sign_uses_identity_key() {
        let identities = Identities::in_memory();
        let identity = identities.create_identity("alice", ProviderType::PublicKey).unwrap();
        let sig = identities.sign(&identity, b"payload").unwrap();
        assert!(identities.verify(&sig, &identity.public_key, b"payload"));
        assert!(!identities.verify(&sig, &identity.public_key, b"other"));
    }

    #[test]
    fn sign_without_key_fails() {
        let (ours, theirs) = shared_pair();
        let identity = ours.create_identity("alice", ProviderType::PublicKey).unwrap();
        assert!(matches!(
            theirs.sign(&identity, b"x"),
            Err(IdentityError::KeyNotFound(_))
        ));
    }
}
