use std::sync::Arc;

use orbit_crypto::ContentHasher;
use orbit_store::Storage;
use orbit_types::Hash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DatabaseType;
use crate::error::{DbError, DbResult};

/// Content-addressed CBOR blocks over a [`Storage`].
///
/// Values are stored under the hash of their canonical encoding and
/// re-verified on read.
#[derive(Clone)]
pub struct ContentStore {
    storage: Arc<dyn Storage>,
}

impl ContentStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn put<T: Serialize>(&self, hasher: &ContentHasher, value: &T) -> DbResult<Hash> {
        let (hash, bytes) = hasher.hash_cbor(value)?;
        self.storage.put(&hash.to_string(), &bytes)?;
        Ok(hash)
    }

    pub fn get<T: DeserializeOwned>(&self, hasher: &ContentHasher, hash: &Hash) -> DbResult<Option<T>> {
        let Some(bytes) = self.storage.get(&hash.to_string())? else {
            return Ok(None);
        };
        if !hasher.verify(&bytes, hash) {
            return Err(DbError::CorruptBlock {
                hash: *hash,
                reason: format!("content does not hash under {}", hasher.domain()),
            });
        }
        let value = ciborium::from_reader(bytes.as_slice()).map_err(|e| DbError::CorruptBlock {
            hash: *hash,
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }
}

/// The immutable descriptor a database address points at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    /// Address of the access controller configuration.
    #[serde(rename = "accessController")]
    pub access_controller: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Manifest {
    pub fn new(
        name: impl Into<String>,
        db_type: DatabaseType,
        access_controller: impl Into<String>,
        meta: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.as_str().to_string(),
            access_controller: access_controller.into(),
            meta,
        }
    }

    pub fn database_type(&self) -> DbResult<DatabaseType> {
        self.db_type.parse()
    }

    /// Persist the manifest. Returns its content hash, the database's
    /// address root.
    pub fn store(&self, blocks: &ContentStore) -> DbResult<Hash> {
        blocks.put(&ContentHasher::MANIFEST, self)
    }

    pub fn load(blocks: &ContentStore, hash: &Hash) -> DbResult<Self> {
        blocks
            .get(&ContentHasher::MANIFEST, hash)?
            .ok_or(DbError::ManifestNotFound(*hash))
    }
}
