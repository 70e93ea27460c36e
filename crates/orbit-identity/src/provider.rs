use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{IdentityError, IdentityResult};
use crate::identity::Identity;
use crate::keystore::Keystore;

/// Identity provider kinds known to this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderType {
    /// Ids are Ed25519 public keys held in the local keystore.
    PublicKey,
}

impl ProviderType {
    /// The type tag stored in [`Identity::id_type`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::PublicKey => "publickey",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publickey" => Ok(ProviderType::PublicKey),
            other => Err(IdentityError::UnknownProvider(other.to_string())),
        }
    }
}

/// Derives identity ids and vouches for identities.
pub trait IdentityProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// The provider-level id for the key named `id`.
    fn get_id(&self, keystore: &Keystore, id: &str) -> IdentityResult<String>;

    /// Sign `data` on behalf of the key named `id`.
    fn sign_identity(&self, keystore: &Keystore, data: &[u8], id: &str) -> IdentityResult<String>;

    /// Check the provider's co-signature on `identity`.
    fn verify_identity(&self, identity: &Identity) -> IdentityResult<bool>;
}

/// Provider whose ids are public keys from the local keystore.
///
/// The id is the hex public key of the keystore key named by the caller.
/// That same key co-signs `public_key + signatures.id`.
#[derive(Debug, Default)]
pub struct PublicKeyProvider;

impl IdentityProvider for PublicKeyProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::PublicKey
    }

    fn get_id(&self, keystore: &Keystore, id: &str) -> IdentityResult<String> {
        if id.is_empty() {
            return Err(IdentityError::InvalidIdentity("id is required".into()));
        }
        let key = keystore.get_or_create_key(id)?;
        Ok(key.public_key().to_string())
    }

    fn sign_identity(&self, keystore: &Keystore, data: &[u8], id: &str) -> IdentityResult<String> {
        let key = keystore
            .get_key(id)?
            .ok_or_else(|| IdentityError::KeyNotFound(id.to_string()))?;
        Ok(Keystore::sign(&key, data))
    }

    fn verify_identity(&self, identity: &Identity) -> IdentityResult<bool> {
        let data = format!("{}{}", identity.public_key, identity.signatures.id);
        Ok(Keystore::verify(
            &identity.signatures.public_key,
            &identity.id,
            data.as_bytes(),
        ))
    }
}

/// Lookup table from provider type to provider instance.
///
/// Constructed explicitly and shared by `Arc`; there is no global registry.
pub struct ProviderRegistry {
    providers: HashMap<ProviderType, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// A registry holding every built-in provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PublicKeyProvider));
        registry
    }

    /// Register a provider under its own type, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.provider_type(), provider);
    }

    pub fn get(&self, provider_type: ProviderType) -> IdentityResult<Arc<dyn IdentityProvider>> {
        self.providers
            .get(&provider_type)
            .cloned()
            .ok_or_else(|| IdentityError::UnknownProvider(provider_type.to_string()))
    }

    /// Look up by the type tag carried in an identity.
    pub fn get_by_tag(&self, tag: &str) -> IdentityResult<Arc<dyn IdentityProvider>> {
        self.get(tag.parse()?)
    }

    pub fn is_registered(&self, provider_type: ProviderType) -> bool {
        self.providers.contains_key(&provider_type)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
