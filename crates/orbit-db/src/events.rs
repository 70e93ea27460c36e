use std::ops::Deref;
use std::sync::Arc;

use orbit_log::IteratorOptions;
use orbit_types::{Address, Hash};
use serde_json::Value;

use crate::access::Access;
use crate::config::OpenOptions;
use crate::context::DbContext;
use crate::database::Database;
use crate::error::DbResult;
use crate::manifest::Manifest;
use crate::operation::Operation;

/// One appended event.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub hash: Hash,
    pub value: Value,
}

/// Append-only feed of values.
#[derive(Clone, Debug)]
pub struct EventsDb {
    db: Arc<Database>,
}

impl EventsDb {
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

    pub async fn add(&self, value: Value) -> DbResult<Hash> {
        self.db.add_operation(Operation::add(value)).await
    }

    /// The value of a merged event.
    pub fn get(&self, hash: &Hash) -> DbResult<Option<Value>> {
        if !self.db.log().has(hash)? {
            return Ok(None);
        }
        Ok(self
            .db
            .log()
            .get(hash)?
            .and_then(|entry| entry.payload.value))
    }

    /// Events newest first within the bounds of `options`.
    pub fn iterator(&self, options: IteratorOptions) -> DbResult<Vec<EventRecord>> {
        let mut out = Vec::new();
        for entry in self.db.log().iterator(options)? {
            let entry = entry?;
            out.push(EventRecord {
                hash: entry.hash,
                value: entry.payload.value.unwrap_or(Value::Null),
            });
        }
        Ok(out)
    }

    /// Every event, oldest first.
    pub fn all(&self) -> DbResult<Vec<EventRecord>> {
        let mut events = self.iterator(IteratorOptions::default())?;
        events.reverse();
        Ok(events)
    }
}

impl Deref for EventsDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}
