use std::path::Path;
use std::sync::RwLock;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::Storage;

const VALUES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("values-1");

/// Persistent ordered key-value store backed by a single redb file.
///
/// Each write is its own transaction. `close` releases the file so the same
/// path can be opened again within the process.
pub struct RedbStorage {
    db: RwLock<Option<Database>>,
}

impl RedbStorage {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening redb storage");
        let db = Database::create(path).map_err(backend)?;
        Self::init(db)
    }

    /// A store that lives only in memory, for tests.
    pub fn in_memory() -> StoreResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        let tx = db.begin_write().map_err(backend)?;
        {
            let _table = tx.open_table(VALUES_TABLE).map_err(backend)?;
        }
        tx.commit().map_err(backend)?;
        Ok(Self {
            db: RwLock::new(Some(db)),
        })
    }

    fn with_db<R>(&self, f: impl FnOnce(&Database) -> StoreResult<R>) -> StoreResult<R> {
        let guard = self.db.read().expect("lock poisoned");
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(StoreError::Closed),
        }
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl Storage for RedbStorage {
    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.with_db(|db| {
            let tx = db.begin_write().map_err(backend)?;
            {
                let mut table = tx.open_table(VALUES_TABLE).map_err(backend)?;
                table.insert(key, value).map_err(backend)?;
            }
            tx.commit().map_err(backend)
        })
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_db(|db| {
            let tx = db.begin_read().map_err(backend)?;
            let table = tx.open_table(VALUES_TABLE).map_err(backend)?;
            let row = table.get(key).map_err(backend)?;
            Ok(row.map(|v| v.value().to_vec()))
        })
    }

    fn del(&self, key: &str) -> StoreResult<()> {
        self.with_db(|db| {
            let tx = db.begin_write().map_err(backend)?;
            {
                let mut table = tx.open_table(VALUES_TABLE).map_err(backend)?;
                table.remove(key).map_err(backend)?;
            }
            tx.commit().map_err(backend)
        })
    }

    fn entries(&self) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.with_db(|db| {
            let tx = db.begin_read().map_err(backend)?;
            let table = tx.open_table(VALUES_TABLE).map_err(backend)?;
            let mut all = Vec::new();
            for row in table.iter().map_err(backend)? {
                let (k, v) = row.map_err(backend)?;
                all.push((k.value().to_string(), v.value().to_vec()));
            }
            Ok(all)
        })
    }

    fn clear(&self) -> StoreResult<()> {
        self.with_db(|db| {
            let tx = db.begin_write().map_err(backend)?;
            {
                let mut table = tx.open_table(VALUES_TABLE).map_err(backend)?;
                let mut keys = Vec::new();
                for row in table.iter().map_err(backend)? {
                    let (k, _) = row.map_err(backend)?;
                    keys.push(k.value().to_string());
                }
                for key in &keys {
                    table.remove(key.as_str()).map_err(backend)?;
                }
            }
            tx.commit().map_err(backend)
        })
    }

    fn close(&self) -> StoreResult<()> {
        self.db.write().expect("lock poisoned").take();
        Ok(())
    }
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self.db.read().map(|g| g.is_some()).unwrap_or(false);
        f.debug_struct("RedbStorage").field("open", &open).finish()
    }
}
