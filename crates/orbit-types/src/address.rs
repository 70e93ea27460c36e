use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::hash::Hash;

/// Protocol segment of every database address.
pub const ADDRESS_PROTOCOL: &str = "orbitdb";

/// Database address: `/orbitdb/<manifest hash>`.
///
/// The hash is the content hash of the database manifest, so the address
/// is stable for a given name, type, and access controller.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    root: Hash,
}

impl Address {
    pub fn new(root: Hash) -> Self {
        Self { root }
    }

    /// The manifest hash this address points at.
    pub fn root(&self) -> &Hash {
        &self.root
    }

    /// Returns `true` if `s` parses as an address.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Parse `/orbitdb/<hash>`. A missing leading slash is tolerated, as is
    /// a trailing path after the hash.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.trim_start_matches('/');
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next()) {
            (Some(ADDRESS_PROTOCOL), Some(hash)) if !hash.is_empty() => {
                let root =
                    Hash::parse(hash).map_err(|e| TypeError::InvalidAddress(format!("{s}: {e}")))?;
                Ok(Self { root })
            }
            _ => Err(TypeError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{ADDRESS_PROTOCOL}/{}", self.root)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.root.short_hex())
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Hash> for Address {
    fn from(root: Hash) -> Self {
        Self::new(root)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let hash = Hash::from_bytes(b"manifest");
        let addr = Address::new(hash);
        assert_eq!(addr.to_string(), format!("/orbitdb/{hash}"));
    }

    #[test]
    fn parse_roundtrip() {
        let addr = Address::new(Hash::from_bytes(b"manifest"));
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn parse_tolerates_missing_slash_and_suffix() {
        let hash = Hash::from_bytes(b"manifest");
        assert!(Address::is_valid(&format!("orbitdb/{hash}")));
        assert!(Address::is_valid(&format!("/orbitdb/{hash}/extra")));
    }

    #[test]
    fn parse_rejects_names() {
        assert!(!Address::is_valid("my-database"));
        assert!(!Address::is_valid("/ipfs/abc"));
        assert!(!Address::is_valid("/orbitdb/"));
        assert!(!Address::is_valid("/orbitdb/not-a-hash"));
    }
}
