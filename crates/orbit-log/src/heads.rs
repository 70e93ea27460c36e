use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use orbit_store::Storage;
use orbit_types::Hash;

use crate::entry::{Entry, Payload};
use crate::error::{LogError, LogResult};

/// Entries that no other entry in `entries` names as `next`.
///
/// The result is ordered latest clock first, ties by hash.
pub fn find_heads<T: Clone>(entries: &[Entry<T>]) -> Vec<Entry<T>> {
    let referenced: HashSet<&Hash> = entries.iter().flat_map(|e| e.next.iter()).collect();
    let mut heads: Vec<Entry<T>> = Vec::new();
    let mut seen: HashSet<Hash> = HashSet::new();
    for entry in entries {
        if !referenced.contains(&entry.hash) && seen.insert(entry.hash) {
            heads.push(entry.clone());
        }
    }
    heads.sort_by(|a, b| b.clock.cmp(&a.clock).then_with(|| b.hash.cmp(&a.hash)));
    heads
}

/// The persisted head set of a log.
///
/// Stored as entry bytes keyed by entry hash, so a log reopened over the
/// same storage resumes where it left off.
pub struct Heads<T> {
    storage: Arc<dyn Storage>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Heads<T> {
    /// Open over `storage`. Initial entries, when given, replace whatever was
    /// stored.
    pub fn new(storage: Arc<dyn Storage>, initial: Option<&[Entry<T>]>) -> LogResult<Self> {
        let heads = Self {
            storage,
            _payload: PhantomData,
        };
        if let Some(entries) = initial {
            heads.set(&find_heads(entries))?;
        }
        Ok(heads)
    }

    /// Every stored head, latest clock first.
    pub fn all(&self) -> LogResult<Vec<Entry<T>>> {
        let mut entries = Vec::new();
        for (key, bytes) in self.storage.entries()? {
            let entry = Entry::decode(&bytes)?;
            if entry.hash.to_string() != key {
                return Err(LogError::Corrupt {
                    hash: entry.hash,
                    reason: format!("stored under {key}"),
                });
            }
            entries.push(entry);
        }
        Ok(find_heads(&entries))
    }

    /// Store an entry as a head without recomputing the set.
    pub fn put(&self, entry: &Entry<T>) -> LogResult<()> {
        self.storage.put(&entry.hash.to_string(), &entry.bytes)?;
        Ok(())
    }

    /// Replace the head set.
    pub fn set(&self, entries: &[Entry<T>]) -> LogResult<()> {
        self.storage.clear()?;
        for entry in entries {
            self.put(entry)?;
        }
        Ok(())
    }

    /// Add an entry and recompute the head set.
    ///
    /// Returns `None` if the entry already is a head.
    pub fn add(&self, entry: &Entry<T>) -> LogResult<Option<Vec<Entry<T>>>> {
        let mut current = self.all()?;
        if current.iter().any(|head| head.hash == entry.hash) {
            return Ok(None);
        }
        current.push(entry.clone());
        let heads = find_heads(&current);
        self.set(&heads)?;
        Ok(Some(heads))
    }

    pub fn remove(&self, hash: &Hash) -> LogResult<()> {
        self.storage.del(&hash.to_string())?;
        Ok(())
    }

    pub fn clear(&self) -> LogResult<()> {
        Ok(self.storage.clear()?)
    }

    pub fn close(&self) -> LogResult<()> {
        Ok(self.storage.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_identity::{Identities, Identity, ProviderType};
    use orbit_store::MemoryStorage;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    // ---- helpers ----

    fn setup() -> (Identities, Identity) {
        let identities = Identities::in_memory();
        let identity = identities
            .create_identity("userA", ProviderType::PublicKey)
            .unwrap();
        (identities, identity)
    }

    fn entry(ids: &Identities, identity: &Identity, n: u64, next: &[&Entry<Value>]) -> Entry<Value> {
        let clock = orbit_types::Clock::new(identity.public_key.clone(), n);
        Entry::create(
            ids,
            identity,
            "log",
            json!(n),
            Some(clock),
            next.iter().map(|e| e.hash).collect(),
            vec![],
        )
        .unwrap()
    }

    // ---- find_heads ----

    #[test]
    fn linear_chain_has_one_head() {
        let (ids, identity) = setup();
        let e1 = entry(&ids, &identity, 1, &[]);
        let e2 = entry(&ids, &identity, 2, &[&e1]);
        let e3 = entry(&ids, &identity, 3, &[&e2]);
        assert_eq!(find_heads(&[e1, e2, e3.clone()]), vec![e3]);
    }

    #[test]
    fn fork_has_two_heads_latest_first() {
        let (ids, identity) = setup();
        let root = entry(&ids, &identity, 1, &[]);
        let left = entry(&ids, &identity, 2, &[&root]);
        let right = entry(&ids, &identity, 3, &[&root]);
        let heads = find_heads(&[root, left.clone(), right.clone()]);
        assert_eq!(heads, vec![right, left]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let (ids, identity) = setup();
        let e1 = entry(&ids, &identity, 1, &[]);
        assert_eq!(find_heads(&[e1.clone(), e1.clone()]).len(), 1);
    }

    #[test]
    fn empty_input_has_no_heads() {
        assert!(find_heads::<Value>(&[]).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn heads_are_exactly_unreferenced(parents in proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..3), 1..8)) {
            let (ids, identity) = setup();
            let mut entries: Vec<Entry<Value>> = Vec::new();
            for (i, picks) in parents.iter().enumerate() {
                let next: Vec<&Entry<Value>> = if entries.is_empty() {
                    vec![]
                } else {
                    picks.iter().map(|p| &entries[p.index(entries.len())]).collect()
                };
                let e = entry(&ids, &identity, i as u64, &next);
                entries.push(e);
            }
            let referenced: HashSet<Hash> = entries.iter().flat_map(|e| e.next.clone()).collect();
            let expected: HashSet<Hash> = entries.iter().map(|e| e.hash).filter(|h| !referenced.contains(h)).collect();
            let actual: HashSet<Hash> = find_heads(&entries).iter().map(|e| e.hash).collect();
            prop_assert_eq!(actual, expected);
        }
    }

    // ---- Heads ----

    #[test]
    fn add_recomputes_and_persists() {
        let (ids, identity) = setup();
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let heads: Heads<Value> = Heads::new(storage.clone(), None).unwrap();
        let e1 = entry(&ids, &identity, 1, &[]);
        let e2 = entry(&ids, &identity, 2, &[&e1]);

        assert_eq!(heads.add(&e1).unwrap(), Some(vec![e1.clone()]));
        assert_eq!(heads.add(&e1).unwrap(), None);
        heads.remove(&e1.hash).unwrap();
        heads.add(&e2).unwrap();
        assert_eq!(heads.all().unwrap(), vec![e2.clone()]);

        let reopened: Heads<Value> = Heads::new(storage, None).unwrap();
        assert_eq!(reopened.all().unwrap(), vec![e2]);
    }

    #[test]
    fn initial_entries_are_reduced_to_heads() {
        let (ids, identity) = setup();
        let e1 = entry(&ids, &identity, 1, &[]);
        let e2 = entry(&ids, &identity, 2, &[&e1]);
        let heads: Heads<Value> =
            Heads::new(Arc::new(MemoryStorage::new()), Some(&[e1, e2.clone()][..])).unwrap();
        assert_eq!(heads.all().unwrap(), vec![e2]);
    }

    #[test]
    fn set_replaces_and_clear_empties() {
        let (ids, identity) = setup();
        let e1 = entry(&ids, &identity, 1, &[]);
        let e2 = entry(&ids, &identity, 2, &[]);
        let heads: Heads<Value> = Heads::new(Arc::new(MemoryStorage::new()), None).unwrap();
        heads.set(&[e1]).unwrap();
        heads.set(&[e2.clone()]).unwrap();
        assert_eq!(heads.all().unwrap(), vec![e2]);
        heads.clear().unwrap();
        assert!(heads.all().unwrap().is_empty());
    }
}
