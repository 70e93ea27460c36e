use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use orbit_store::Storage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::AccessControllerType;
use crate::error::{DbError, DbResult};

/// Process-level settings for an [`OrbitDb`](crate::OrbitDb).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitDbConfig {
    /// Name of the keystore key the default identity is created from.
    pub id: String,
    /// Root for persistent state. `None` keeps everything in memory.
    pub directory: Option<PathBuf>,
    pub sync_timeout_ms: u64,
    pub references_count: usize,
    pub lru_capacity: usize,
}

impl Default for OrbitDbConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            directory: None,
            sync_timeout_ms: 30_000,
            references_count: 16,
            lru_capacity: 1000,
        }
    }
}

impl OrbitDbConfig {
    /// In-memory configuration for the identity named `id`.
    pub fn in_memory(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> DbResult<Self> {
        toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

/// The kinds of database a manifest can describe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    #[default]
    #[serde(rename = "events")]
    Events,
    #[serde(rename = "documents")]
    Documents,
    #[serde(rename = "keyvalue")]
    KeyValue,
    #[serde(rename = "keyvalue-indexed")]
    KeyValueIndexed,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Documents => "documents",
            Self::KeyValue => "keyvalue",
            Self::KeyValueIndexed => "keyvalue-indexed",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(Self::Events),
            "documents" => Ok(Self::Documents),
            "keyvalue" => Ok(Self::KeyValue),
            "keyvalue-indexed" => Ok(Self::KeyValueIndexed),
            other => Err(DbError::UnknownDatabaseType(other.to_string())),
        }
    }
}

/// Access controller to create for a new database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessOptions {
    pub ac_type: AccessControllerType,
    /// Identity ids allowed to write. Empty means the opening identity.
    pub write: Vec<String>,
}

/// Per-database options for [`OrbitDb::open`](crate::OrbitDb::open).
///
/// Options that only matter at creation (`db_type`, `access`, `meta`) are
/// ignored when opening an existing address, except that a given `db_type`
/// must match the manifest.
#[derive(Clone)]
pub struct OpenOptions {
    pub db_type: Option<DatabaseType>,
    pub access: AccessOptions,
    pub meta: Option<Value>,
    /// Skip-list size for appends; the config default when unset.
    pub references_count: Option<usize>,
    /// Replicate with peers.
    pub sync: bool,
    /// Document field used as the key; `_id` when unset.
    pub index_by: Option<String>,
    pub entry_storage: Option<Arc<dyn Storage>>,
    pub heads_storage: Option<Arc<dyn Storage>>,
    pub index_storage: Option<Arc<dyn Storage>>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            db_type: None,
            access: AccessOptions::default(),
            meta: None,
            references_count: None,
            sync: true,
            index_by: None,
            entry_storage: None,
            heads_storage: None,
            index_storage: None,
        }
    }
}

impl OpenOptions {
    pub fn with_type(mut self, db_type: DatabaseType) -> Self {
        self.db_type = Some(db_type);
        self
    }

    pub fn with_access(mut self, ac_type: AccessControllerType) -> Self {
        self.access.ac_type = ac_type;
        self
    }

    pub fn with_write<I, S>(mut self, write: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access.write = write.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_references_count(mut self, count: usize) -> Self {
        self.references_count = Some(count);
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_index_by(mut self, field: impl Into<String>) -> Self {
        self.index_by = Some(field.into());
        self
    }

    pub fn with_entry_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.entry_storage = Some(storage);
        self
    }

    pub fn with_heads_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.heads_storage = Some(storage);
        self
    }

    pub fn with_index_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.index_storage = Some(storage);
        self
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("db_type", &self.db_type)
            .field("access", &self.access)
            .field("meta", &self.meta)
            .field("references_count", &self.references_count)
            .field("sync", &self.sync)
            .field("index_by", &self.index_by)
            .finish_non_exhaustive()
    }
}
