use std::ops::Deref;
use std::sync::Arc;

use orbit_types::{Address, Hash};
use serde_json::Value;

use crate::access::Access;
use crate::config::OpenOptions;
use crate::context::DbContext;
use crate::database::Database;
use crate::error::{DbError, DbResult};
use crate::manifest::Manifest;
use crate::operation::Operation;
use crate::replay::{self, Record};

/// Document field used as the key when none is configured.
pub const DEFAULT_INDEX_BY: &str = "_id";

/// JSON documents keyed by one of their fields.
#[derive(Clone, Debug)]
pub struct DocumentsDb {
    db: Arc<Database>,
    index_by: String,
}

impl DocumentsDb {
    pub async fn open(
        ctx: &DbContext,
        address: Address,
        manifest: &Manifest,
        access: Access,
        options: &OpenOptions,
    ) -> DbResult<Self> {
        let index_by = options
            .index_by
            .clone()
            .unwrap_or_else(|| DEFAULT_INDEX_BY.to_string());
        let db = Database::open(ctx, address, manifest, access, options, None).await?;
        Ok(Self {
            db: Arc::new(db),
            index_by,
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn index_by(&self) -> &str {
        &self.index_by
    }

    /// Store `doc` under the value of its key field, which must be a string
    /// or a number.
    pub async fn put(&self, doc: Value) -> DbResult<Hash> {
        let key = match doc.get(&self.index_by) {
            Some(Value::String(key)) => key.clone(),
            Some(Value::Number(key)) => key.to_string(),
            _ => return Err(DbError::MissingKey(self.index_by.clone())),
        };
        self.db.add_operation(Operation::put(key, doc)).await
    }

    /// Delete the document stored under `key`.
    pub async fn del(&self, key: &str) -> DbResult<Hash> {
        if replay::latest(self.db.log(), key)?.is_none() {
            return Err(DbError::NoEntry(key.to_string()));
        }
        self.db.add_operation(Operation::del(key)).await
    }

    pub fn get(&self, key: &str) -> DbResult<Option<Value>> {
        Ok(replay::latest(self.db.log(), key)?.map(|r| r.value))
    }

    /// Live documents matching `predicate`, newest first.
    pub fn query(&self, predicate: impl Fn(&Value) -> bool) -> DbResult<Vec<Value>> {
        Ok(replay::records(self.db.log(), None)?
            .into_iter()
            .map(|r| r.value)
            .filter(|doc| predicate(doc))
            .collect())
    }

    /// Live documents, most recently written first.
    pub fn iterator(&self, amount: Option<usize>) -> DbResult<Vec<Record>> {
        replay::records(self.db.log(), amount)
    }

    /// Every live document, least recently written first.
    pub fn all(&self) -> DbResult<Vec<Record>> {
        let mut records = self.iterator(None)?;
        records.reverse();
        Ok(records)
    }
}

impl Deref for DocumentsDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}
