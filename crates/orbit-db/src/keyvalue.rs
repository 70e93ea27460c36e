use std::ops::Deref;
use std::sync::Arc;

use orbit_types::{Address, Hash};
use serde_json::Value;

use crate::access::Access;
use crate::config::OpenOptions;
use crate::context::DbContext;
use crate::database::Database;
use crate::error::DbResult;
use crate::manifest::Manifest;
use crate::operation::Operation;
use crate::replay::{self, Record};

/// Key-value view resolved by replaying the log on every read.
#[derive(Clone, Debug)]
pub struct KeyValueDb {
    db: Arc<Database>,
}

impl KeyValueDb {
    pub async fn open(
        ctx: &DbContext,
        address: Address,
        manifest: &Manifest,
        access: Access,
        options: &OpenOptions,
    ) -> DbResult<Self> {
        let db = Database::open(ctx, address, manifest, access, options, None).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub async fn put(&self, key: &str, value: Value) -> DbResult<Hash> {
        self.db.add_operation(Operation::put(key, value)).await
    }

    pub async fn set(&self, key: &str, value: Value) -> DbResult<Hash> {
        self.put(key, value).await
    }

    pub async fn del(&self, key: &str) -> DbResult<Hash> {
        self.db.add_operation(Operation::del(key)).await
    }

    pub fn get(&self, key: &str) -> DbResult<Option<Value>> {
        Ok(replay::latest(self.db.log(), key)?.map(|r| r.value))
    }

    /// Live records, most recently written first.
    pub fn iterator(&self, amount: Option<usize>) -> DbResult<Vec<Record>> {
        replay::records(self.db.log(), amount)
    }

    /// Every live record, least recently written first.
    pub fn all(&self) -> DbResult<Vec<Record>> {
        let mut records = self.iterator(None)?;
        records.reverse();
        Ok(records)
    }
}

impl Deref for KeyValueDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}
