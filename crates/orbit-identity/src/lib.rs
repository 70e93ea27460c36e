//! Identities for the Orbit replicated log.
//!
//! Every log entry is signed by an [`Identity`]. An identity binds a
//! provider-derived id to an Ed25519 public key through two signatures:
//! the identity key signs the id, and the provider co-signs the public key
//! and that signature. Identities are content-addressed and stored by hash,
//! so entries reference their signer by [`Hash`](orbit_types::Hash).
//!
//! # Key Types
//!
//! - [`Keystore`] -- Named signing keys over any [`Storage`](orbit_store::Storage)
//! - [`IdentityProvider`] -- Pluggable id derivation and verification
//! - [`ProviderRegistry`] -- Explicit lookup table from [`ProviderType`] to provider
//! - [`Identities`] -- Creates, stores, fetches, and verifies identities

pub mod error;
pub mod identities;
pub mod identity;
pub mod keystore;
pub mod provider;

pub use error::{IdentityError, IdentityResult};
pub use identities::Identities;
pub use identity::{Identity, IdentitySignatures};
pub use keystore::Keystore;
pub use provider::{IdentityProvider, ProviderRegistry, ProviderType, PublicKeyProvider};
