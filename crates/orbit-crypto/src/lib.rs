//! Cryptographic primitives for the Orbit replicated log.
//!
//! Provides domain-separated BLAKE3 content hashing over canonical CBOR
//! encodings and Ed25519 signing/verification with hex text forms.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod hasher;
pub mod signer;

pub use hasher::{encode_canonical, ContentHasher, HasherError};
pub use signer::{verify_hex, PublicKey, Signature, SignatureError, SigningKey};
