//! The operation log and its traversal algorithms.
//!
//! [`Log`] keeps three stores: entry bytes by hash, the head set, and an
//! index of merged hashes. Appends and joins are serialized per log by an
//! async mutex; reads go straight to storage.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use orbit_identity::{Identities, Identity};
use orbit_store::{MemoryStorage, Storage};
use orbit_types::{Clock, Hash};
use tokio::sync::Mutex;
use tracing::debug;

use crate::access::{AccessController, AllowAll};
use crate::conflict::{last_write_wins, NoZeroes, SortFn};
use crate::entry::{Entry, Payload};
use crate::error::{LogError, LogResult};
use crate::heads::Heads;

/// Index value marking a hash as merged.
const INDEXED: &[u8] = b"1";

/// Construction options for [`Log::open`]. Unset stores default to memory.
pub struct LogOptions<T: Payload> {
    /// Log id; a fresh UUID when unset.
    pub log_id: Option<String>,
    /// Initial heads, replacing any persisted ones.
    pub heads: Option<Vec<Entry<T>>>,
    pub access: Option<Arc<dyn AccessController<T>>>,
    pub entry_storage: Option<Arc<dyn Storage>>,
    pub heads_storage: Option<Arc<dyn Storage>>,
    pub index_storage: Option<Arc<dyn Storage>>,
    /// Entry order; [`last_write_wins`] when unset.
    pub sort_fn: Option<SortFn<T>>,
}

impl<T: Payload> Default for LogOptions<T> {
    fn default() -> Self {
        Self {
            log_id: None,
            heads: None,
            access: None,
            entry_storage: None,
            heads_storage: None,
            index_storage: None,
            sort_fn: None,
        }
    }
}

impl<T: Payload> LogOptions<T> {
    pub fn with_id(mut self, log_id: impl Into<String>) -> Self {
        self.log_id = Some(log_id.into());
        self
    }

    pub fn with_access(mut self, access: Arc<dyn AccessController<T>>) -> Self {
        self.access = Some(access);
        self
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AppendOptions {
    /// How many ancestors beyond the heads to record in `refs`.
    pub references_count: usize,
}

/// Range bounds for [`Log::iterator`]. Iteration runs from newest to oldest.
#[derive(Clone, Debug, Default)]
pub struct IteratorOptions {
    /// Stop at this entry, excluding it.
    pub gt: Option<Hash>,
    /// Stop at this entry, including it.
    pub gte: Option<Hash>,
    /// Start below this entry.
    pub lt: Option<Hash>,
    /// Start at this entry.
    pub lte: Option<Hash>,
    /// Maximum entries to yield; unbounded when unset.
    pub amount: Option<usize>,
}

/// A signed, append-only Merkle-DAG log.
pub struct Log<T: Payload> {
    id: String,
    identity: Identity,
    identities: Arc<Identities>,
    access: Arc<dyn AccessController<T>>,
    entries: Arc<dyn Storage>,
    heads: Heads<T>,
    index: Arc<dyn Storage>,
    sort: NoZeroes<T>,
    write_lock: Mutex<()>,
}

impl<T: Payload> Log<T> {
    /// Open a log for `identity`, resuming from whatever the stores hold.
    pub fn open(
        identities: Arc<Identities>,
        identity: Identity,
        options: LogOptions<T>,
    ) -> LogResult<Self> {
        if !identity.is_identity() {
            return Err(LogError::Validation("log requires a valid identity".into()));
        }
        let id = options
            .log_id
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        if id.is_empty() {
            return Err(LogError::Validation("log id must not be empty".into()));
        }
        let memory = || -> Arc<dyn Storage> { Arc::new(MemoryStorage::new()) };
        let entries = options.entry_storage.unwrap_or_else(memory);
        let index = options.index_storage.unwrap_or_else(memory);
        let heads = Heads::new(
            options.heads_storage.unwrap_or_else(memory),
            options.heads.as_deref(),
        )?;
        for head in options.heads.iter().flatten() {
            entries.put(&head.hash.to_string(), &head.bytes)?;
            index.put(&head.hash.to_string(), INDEXED)?;
        }
        let sort = NoZeroes::new(
            options
                .sort_fn
                .unwrap_or_else(|| Arc::new(last_write_wins::<T>)),
        );
        debug!(log = %id, identity = %identity.hash.short_hex(), "opened log");
        Ok(Self {
            id,
            identity,
            identities,
            access: options.access.unwrap_or_else(|| Arc::new(AllowAll)),
            entries,
            heads,
            index,
            sort,
            write_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn identities(&self) -> &Arc<Identities> {
        &self.identities
    }

    pub fn access(&self) -> &Arc<dyn AccessController<T>> {
        &self.access
    }

    /// The comparator this log orders entries with.
    pub fn sorter(&self) -> &NoZeroes<T> {
        &self.sort
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Current heads, latest first.
    pub fn heads(&self) -> LogResult<Vec<Entry<T>>> {
        let mut heads = self.heads.all()?;
        self.sort.sort_latest_first(&mut heads)?;
        Ok(heads)
    }

    /// Own clock at the latest head time.
    pub fn clock(&self) -> LogResult<Clock> {
        Ok(self.clock_over(&self.heads.all()?))
    }

    fn clock_over(&self, heads: &[Entry<T>]) -> Clock {
        let time = heads.iter().map(|e| e.clock.time).max().unwrap_or(0);
        Clock::new(self.identity.public_key.clone(), time)
    }

    /// Fetch an entry from entry storage, whether merged or not.
    pub fn get(&self, hash: &Hash) -> LogResult<Option<Entry<T>>> {
        let Some(bytes) = self.entries.get(&hash.to_string())? else {
            return Ok(None);
        };
        let entry = Entry::decode(&bytes)?;
        if entry.hash != *hash {
            return Err(LogError::Corrupt {
                hash: *hash,
                reason: format!("bytes decode to {}", entry.hash),
            });
        }
        Ok(Some(entry))
    }

    /// Returns `true` if `hash` has been merged into this log.
    pub fn has(&self, hash: &Hash) -> LogResult<bool> {
        Ok(self.index.contains(&hash.to_string())?)
    }

    /// Every entry, oldest first.
    pub fn values(&self) -> LogResult<Vec<Entry<T>>> {
        let mut all = self
            .traverse(None, |_| false, true)?
            .collect::<LogResult<Vec<_>>>()?;
        all.reverse();
        Ok(all)
    }

    /// Lazy depth-first walk from `roots` (default: the heads).
    ///
    /// The frontier is re-sorted before each step so the latest entry is
    /// visited next. Each entry is yielded once; the walk ends after the
    /// first entry for which `should_stop` returns `true`. Entries missing
    /// from storage are skipped.
    pub fn traverse<'a>(
        &'a self,
        roots: Option<Vec<Entry<T>>>,
        should_stop: impl FnMut(&Entry<T>) -> bool + Send + 'a,
        use_refs: bool,
    ) -> LogResult<Traversal<'a, T>> {
        let stack = match roots {
            Some(roots) => roots,
            None => self.heads()?,
        };
        let fetched = stack.iter().map(|e| e.hash).collect();
        Ok(Traversal {
            log: self,
            stack,
            traversed: HashSet::new(),
            fetched,
            should_stop: Box::new(should_stop),
            use_refs,
            done: false,
        })
    }

    /// Range query from newest towards the bounds in `options`.
    ///
    /// With both an end bound (`gt`/`gte`) and an `amount`, the whole range
    /// is walked and the `amount` entries closest to the end bound are
    /// returned.
    pub fn iterator(&self, options: IteratorOptions) -> LogResult<LogIterator<'_, T>> {
        let IteratorOptions {
            gt,
            gte,
            lt,
            lte,
            amount,
        } = options;
        if amount == Some(0) {
            return Ok(LogIterator::Empty);
        }

        let start = if let Some(hash) = lte {
            self.get(&hash)?.into_iter().collect()
        } else if let Some(hash) = lt {
            match self.get(&hash)? {
                Some(entry) => {
                    let mut nexts = Vec::new();
                    for next in &entry.next {
                        if let Some(e) = self.get(next)? {
                            nexts.push(e);
                        }
                    }
                    nexts
                }
                None => Vec::new(),
            }
        } else {
            self.heads()?
        };

        let end = gt.or(gte);
        let limit = if end.is_some() { None } else { amount };
        let mut count = 0usize;
        let should_stop = move |entry: &Entry<T>| {
            count += 1;
            if limit.is_some_and(|limit| count >= limit) {
                return true;
            }
            end == Some(entry.hash)
        };
        let traversal = self.traverse(Some(start), should_stop, true)?;

        match (end, amount) {
            (Some(_), Some(amount)) => {
                let mut buffer = VecDeque::with_capacity(amount + 1);
                for entry in traversal {
                    let entry = entry?;
                    if gt == Some(entry.hash) {
                        continue;
                    }
                    buffer.push_back(entry);
                    if buffer.len() > amount {
                        buffer.pop_front();
                    }
                }
                Ok(LogIterator::Buffered(buffer.into_iter()))
            }
            _ => Ok(LogIterator::Streaming {
                traversal,
                skip: gt,
            }),
        }
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Append a new entry on top of the current heads.
    pub async fn append(&self, payload: T, options: AppendOptions) -> LogResult<Entry<T>> {
        let _guard = self.write_lock.lock().await;

        let heads = self.heads()?;
        let next: Vec<Hash> = heads.iter().map(|e| e.hash).collect();
        let refs = self.references(&heads, options.references_count)?;
        let clock = self.clock_over(&heads).tick();
        let entry = Entry::create(
            &self.identities,
            &self.identity,
            &self.id,
            payload,
            Some(clock),
            next,
            refs,
        )?;

        if !self.access.can_append(&entry).await? {
            return Err(LogError::NotAllowed {
                identity: self.identity.hash,
            });
        }

        let key = entry.hash.to_string();
        self.entries.put(&key, &entry.bytes)?;
        self.index.put(&key, INDEXED)?;
        self.heads.set(std::slice::from_ref(&entry))?;
        debug!(
            log = %self.id,
            entry = %entry.hash.short_hex(),
            time = entry.clock.time,
            "appended entry"
        );
        Ok(entry)
    }

    /// Ancestors of `heads` for the skip list, excluding the heads.
    fn references(&self, heads: &[Entry<T>], references_count: usize) -> LogResult<Vec<Hash>> {
        if references_count == 0 || heads.is_empty() {
            return Ok(Vec::new());
        }
        let amount = references_count + heads.len();
        let head_hashes: HashSet<Hash> = heads.iter().map(|e| e.hash).collect();
        let mut refs = Vec::new();
        for entry in self.traverse(Some(heads.to_vec()), |_| false, false)? {
            let entry = entry?;
            if head_hashes.contains(&entry.hash) {
                continue;
            }
            refs.push(entry.hash);
            if refs.len() >= amount {
                break;
            }
        }
        Ok(refs)
    }

    /// Merge another replica of this log.
    pub async fn join(&self, other: &Log<T>) -> LogResult<()> {
        if other.id != self.id {
            return Err(LogError::LogIdMismatch {
                expected: self.id.clone(),
                actual: other.id.clone(),
            });
        }
        self.entries.merge(other.entries.as_ref())?;
        for head in other.heads()? {
            self.join_entry(&head).await?;
        }
        Ok(())
    }

    /// Merge a single entry and every ancestor not yet merged.
    ///
    /// Returns `false` if the entry was already merged. Every new entry is
    /// verified before anything is written, so a failed join leaves the log
    /// untouched.
    pub async fn join_entry(&self, entry: &Entry<T>) -> LogResult<bool> {
        let _guard = self.write_lock.lock().await;

        if self.has(&entry.hash)? {
            return Ok(false);
        }
        self.verify_entry(entry).await?;

        let head_hashes: HashSet<Hash> = self.heads.all()?.iter().map(|e| e.hash).collect();
        let mut connected_heads = HashSet::new();
        let mut to_add: Vec<Entry<T>> = Vec::new();
        let mut seen: HashSet<Hash> = HashSet::from([entry.hash]);
        let mut work: Vec<Hash> = entry.next.iter().chain(&entry.refs).copied().collect();

        while let Some(hash) = work.pop() {
            if !seen.insert(hash) {
                continue;
            }
            if head_hashes.contains(&hash) {
                connected_heads.insert(hash);
            }
            if self.has(&hash)? {
                continue;
            }
            let ancestor = self.get(&hash)?.ok_or(LogError::MissingEntry(hash))?;
            self.verify_entry(&ancestor).await?;
            work.extend(ancestor.next.iter().chain(&ancestor.refs).copied());
            to_add.push(ancestor);
        }

        for new in to_add.iter().chain(std::iter::once(entry)) {
            let key = new.hash.to_string();
            self.entries.put(&key, &new.bytes)?;
            self.index.put(&key, INDEXED)?;
        }
        for hash in &connected_heads {
            self.heads.remove(hash)?;
        }
        self.heads.add(entry)?;
        debug!(
            log = %self.id,
            entry = %entry.hash.short_hex(),
            ancestors = to_add.len(),
            "joined entry"
        );
        Ok(true)
    }

    async fn verify_entry(&self, entry: &Entry<T>) -> LogResult<()> {
        if entry.id != self.id {
            return Err(LogError::LogIdMismatch {
                expected: self.id.clone(),
                actual: entry.id.clone(),
            });
        }
        if !self.access.can_append(entry).await? {
            return Err(LogError::NotAllowed {
                identity: entry.identity,
            });
        }
        if !entry.verify(&self.identities)? {
            return Err(LogError::InvalidSignature(entry.hash));
        }
        Ok(())
    }

    /// Remove everything this log has stored.
    pub async fn clear(&self) -> LogResult<()> {
        let _guard = self.write_lock.lock().await;
        self.index.clear()?;
        self.heads.clear()?;
        self.entries.clear()?;
        Ok(())
    }

    /// Wait for in-flight writes, then close the stores.
    pub async fn close(&self) -> LogResult<()> {
        let _guard = self.write_lock.lock().await;
        self.index.close()?;
        self.heads.close()?;
        self.entries.close()?;
        Ok(())
    }
}

impl<T: Payload> std::fmt::Debug for Log<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("identity", &self.identity.hash)
            .field("access", &self.access.ac_type())
            .finish()
    }
}

type StopFn<'a, T> = Box<dyn FnMut(&Entry<T>) -> bool + Send + 'a>;

/// Lazy walk over a log, produced by [`Log::traverse`].
pub struct Traversal<'a, T: Payload> {
    log: &'a Log<T>,
    stack: Vec<Entry<T>>,
    traversed: HashSet<Hash>,
    fetched: HashSet<Hash>,
    should_stop: StopFn<'a, T>,
    use_refs: bool,
    done: bool,
}

impl<T: Payload> Traversal<'_, T> {
    fn expand(&mut self, entry: &Entry<T>) -> LogResult<()> {
        let refs: &[Hash] = if self.use_refs { &entry.refs } else { &[] };
        for hash in entry.next.iter().chain(refs) {
            if self.traversed.contains(hash) || !self.fetched.insert(*hash) {
                continue;
            }
            if let Some(next) = self.log.get(hash)? {
                self.stack.push(next);
            }
        }
        Ok(())
    }
}

impl<T: Payload> Iterator for Traversal<'_, T> {
    type Item = LogResult<Entry<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Err(e) = self.log.sort.sort(&mut self.stack) {
                self.done = true;
                return Some(Err(e));
            }
            let Some(entry) = self.stack.pop() else {
                self.done = true;
                return None;
            };
            if !self.traversed.insert(entry.hash) {
                continue;
            }
            if (self.should_stop)(&entry) {
                self.done = true;
                return Some(Ok(entry));
            }
            if let Err(e) = self.expand(&entry) {
                self.done = true;
                return Some(Err(e));
            }
            return Some(Ok(entry));
        }
    }
}

/// Result of [`Log::iterator`].
pub enum LogIterator<'a, T: Payload> {
    Empty,
    Streaming {
        traversal: Traversal<'a, T>,
        skip: Option<Hash>,
    },
    Buffered(std::collections::vec_deque::IntoIter<Entry<T>>),
}

impl<T: Payload> Iterator for LogIterator<'_, T> {
    type Item = LogResult<Entry<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            LogIterator::Empty => None,
            LogIterator::Streaming { traversal, skip } => loop {
                match traversal.next()? {
                    Ok(entry) if Some(entry.hash) == *skip => continue,
                    other => return Some(other),
                }
            },
            LogIterator::Buffered(entries) => entries.next().map(Ok),
        }
    }
}
