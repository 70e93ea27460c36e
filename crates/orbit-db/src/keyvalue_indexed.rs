//! Key-value view with a persisted index.
//!
//! The index maps each key to the bytes of the entry that currently decides
//! it. A second store records which entries have been folded in, so after a
//! merge only the unindexed part of the log is walked. Reads never touch the
//! log.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use orbit_log::{Entry, Log};
use orbit_store::Storage;
use orbit_types::{Address, Hash};
use serde_json::Value;
use tracing::debug;

use crate::access::Access;
use crate::config::OpenOptions;
use crate::context::DbContext;
use crate::database::{Database, UpdateHook};
use crate::error::DbResult;
use crate::manifest::Manifest;
use crate::operation::{OpKind, Operation};
use crate::replay::Record;

const INDEXED: &[u8] = b"1";

struct KeyValueIndex {
    /// key -> encoded deciding entry
    index: Arc<dyn Storage>,
    /// entry hash -> marker
    indexed: Arc<dyn Storage>,
}

impl KeyValueIndex {
    fn lookup(&self, key: &str) -> DbResult<Option<Entry<Operation>>> {
        match self.index.get(key)? {
            Some(bytes) => Ok(Some(Entry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fold every entry not yet indexed into the index, walking back from
    /// the heads and stopping at indexed entries.
    fn catch_up(&self, log: &Log<Operation>) -> DbResult<usize> {
        let mut stack = log.heads()?;
        let mut seen = HashSet::new();
        let mut folded = 0;
        while let Some(entry) = stack.pop() {
            let hash = entry.hash.to_string();
            if !seen.insert(entry.hash) || self.indexed.contains(&hash)? {
                continue;
            }
            self.fold(log, &entry)?;
            self.indexed.put(&hash, INDEXED)?;
            folded += 1;
            for next in &entry.next {
                if let Some(parent) = log.get(next)? {
                    stack.push(parent);
                }
            }
        }
        Ok(folded)
    }

    fn fold(&self, log: &Log<Operation>, entry: &Entry<Operation>) -> DbResult<()> {
        let Some(key) = entry.payload.keyed() else {
            return Ok(());
        };
        let newer = match self.lookup(key)? {
            Some(current) => log.sorter().compare(entry, &current)? == Ordering::Greater,
            None => true,
        };
        if newer {
            self.index.put(key, entry.encode())?;
        }
        Ok(())
    }

    /// Live entries, latest first.
    fn live(&self, log: &Log<Operation>) -> DbResult<Vec<Entry<Operation>>> {
        let mut entries = Vec::new();
        for (_, bytes) in self.index.entries()? {
            let entry: Entry<Operation> = Entry::decode(&bytes)?;
            if entry.payload.op == OpKind::Put {
                entries.push(entry);
            }
        }
        log.sorter().sort_latest_first(&mut entries)?;
        Ok(entries)
    }
}

#[async_trait]
impl UpdateHook for KeyValueIndex {
    async fn on_open(&self, log: &Log<Operation>) -> DbResult<()> {
        let folded = self.catch_up(log)?;
        debug!(log = %log.id(), folded, "index caught up");
        Ok(())
    }

    async fn on_update(&self, log: &Log<Operation>, _entry: &Entry<Operation>) -> DbResult<()> {
        self.catch_up(log)?;
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        self.index.close()?;
        self.indexed.close()?;
        Ok(())
    }

    async fn drop_state(&self) -> DbResult<()> {
        self.index.clear()?;
        self.indexed.clear()?;
        Ok(())
    }
}

fn record(entry: Entry<Operation>) -> Option<Record> {
    let key = entry.payload.key?;
    Some(Record {
        key,
        value: entry.payload.value.unwrap_or(Value::Null),
        hash: entry.hash,
    })
}

/// Key-value view answering reads from its index.
#[derive(Clone)]
pub struct KeyValueIndexedDb {
    db: Arc<Database>,
    index: Arc<KeyValueIndex>,
}

impl KeyValueIndexedDb {
    pub async fn open(
        ctx: &DbContext,
        address: Address,
        manifest: &Manifest,
        access: Access,
        options: &OpenOptions,
    ) -> DbResult<Self> {
        let index = Arc::new(KeyValueIndex {
            index: ctx.local_storage(&address, "_index")?,
            indexed: ctx.local_storage(&address, "_indexedEntries")?,
        });
        let db = Database::open(ctx, address, manifest, access, options, Some(index.clone())).await?;
        Ok(Self {
            db: Arc::new(db),
            index,
        })
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
        Ok(self
            .index
            .lookup(key)?
            .filter(|entry| entry.payload.op == OpKind::Put)
            .and_then(|entry| entry.payload.value))
    }

    /// Live records, most recently written first.
    pub fn iterator(&self, amount: Option<usize>) -> DbResult<Vec<Record>> {
        let live = self.index.live(self.db.log())?;
        Ok(live
            .into_iter()
            .filter_map(record)
            .take(amount.unwrap_or(usize::MAX))
            .collect())
    }

    /// Every live record, least recently written first.
    pub fn all(&self) -> DbResult<Vec<Record>> {
        let mut records = self.iterator(None)?;
        records.reverse();
        Ok(records)
    }
}

impl Deref for KeyValueIndexedDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

impl std::fmt::Debug for KeyValueIndexedDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueIndexedDb")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}
