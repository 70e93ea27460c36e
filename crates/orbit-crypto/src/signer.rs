//! Ed25519 keys and signatures in the forms identities and entries carry:
//! public keys and signatures travel as lowercase hex, secrets are kept as
//! their raw 32 bytes by the keystore.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer, Verifier};

const SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
}

/// A private key held by the keystore.
pub struct SigningKey(ed25519_dalek::SigningKey);

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Rebuild a key from the secret stored by [`SigningKey::secret`].
    pub fn from_secret(secret: &[u8]) -> Result<Self, SignatureError> {
        let secret: [u8; SECRET_LEN] = secret
            .try_into()
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(ed25519_dalek::SigningKey::from_bytes(&secret)))
    }

    pub fn secret(&self) -> &[u8; SECRET_LEN] {
        self.0.as_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.0.sign(data))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SigningKey").field(&self.public_key()).finish()
    }
}

/// The public half of a [`SigningKey`]; displays and parses as hex.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PublicKey {
    pub fn verify(&self, data: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        self.0
            .verify(data, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 32] = hex::decode(s)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(SignatureError::InvalidKey)?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }
}

/// A detached signature; displays and parses as hex.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_string();
        write!(f, "Signature({}..)", &text[..16])
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 64] = hex::decode(s)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or(SignatureError::InvalidSignature)?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&bytes)))
    }
}

/// Check a hex signature against a hex public key. Malformed text verifies
/// as `false`.
pub fn verify_hex(public_key: &str, signature: &str, data: &[u8]) -> bool {
    match (public_key.parse::<PublicKey>(), signature.parse::<Signature>()) {
        (Ok(key), Ok(sig)) => key.verify(data, &sig).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- keys ----

    #[test]
    fn secret_rebuilds_the_same_key() {
        let key = SigningKey::generate();
        let restored = SigningKey::from_secret(key.secret()).unwrap();
        assert_eq!(restored.public_key(), key.public_key());
        assert_eq!(
            SigningKey::from_secret(&[7; 31]).unwrap_err(),
            SignatureError::InvalidKey
        );
    }

    #[test]
    fn public_key_text_form() {
        let key = SigningKey::generate().public_key();
        let text = key.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(text.parse::<PublicKey>().unwrap(), key);
        assert!("abcd".parse::<PublicKey>().is_err());
        assert!("not hex".parse::<PublicKey>().is_err());
    }

    #[test]
    fn debug_hides_the_secret() {
        let key = SigningKey::generate();
        let shown = format!("{key:?}");
        assert!(shown.contains(&key.public_key().to_string()));
        assert!(!shown.contains(&hex::encode(key.secret())));
    }

    // ---- signatures ----

    #[test]
    fn signature_binds_data_and_key() {
        let alice = SigningKey::generate();
        let bob = SigningKey::generate();
        let sig = alice.sign(b"entry bytes");
        assert!(alice.public_key().verify(b"entry bytes", &sig).is_ok());
        assert_eq!(
            alice.public_key().verify(b"other bytes", &sig),
            Err(SignatureError::InvalidSignature)
        );
        assert!(bob.public_key().verify(b"entry bytes", &sig).is_err());
    }

    #[test]
    fn hex_verification() {
        let key = SigningKey::generate();
        let public_key = key.public_key().to_string();
        let sig = key.sign(b"id").to_string();
        assert_eq!(sig.parse::<Signature>().unwrap().to_string(), sig);
        assert!(verify_hex(&public_key, &sig, b"id"));
        assert!(!verify_hex(&public_key, &sig, b"other"));
        assert!(!verify_hex(&public_key, "zz", b"id"));
        assert!(!verify_hex("zz", &sig, b"id"));
    }
}
