//! Deterministic ordering of concurrent entries.
//!
//! Every peer must order the same entry set identically, so comparators
//! must be total over distinct entries. [`NoZeroes`] enforces that at
//! runtime.

use std::cell::Cell;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{LogError, LogResult};

/// A comparator over entries. `Greater` means "later".
pub type SortFn<T> = Arc<dyn Fn(&Entry<T>, &Entry<T>) -> Ordering + Send + Sync>;

/// Compare by clock time, deferring ties to `fallback`.
pub fn sort_by_clocks<T>(
    a: &Entry<T>,
    b: &Entry<T>,
    fallback: impl Fn(&Entry<T>, &Entry<T>) -> Ordering,
) -> Ordering {
    match a.clock.time.cmp(&b.clock.time) {
        Ordering::Equal => fallback(a, b),
        other => other,
    }
}

/// Compare by clock id, deferring ties to `fallback`.
pub fn sort_by_clock_ids<T>(
    a: &Entry<T>,
    b: &Entry<T>,
    fallback: impl Fn(&Entry<T>, &Entry<T>) -> Ordering,
) -> Ordering {
    match a.clock.id.cmp(&b.clock.id) {
        Ordering::Equal => fallback(a, b),
        other => other,
    }
}

/// Compare by entry hash. Only equal for the same entry.
pub fn sort_by_entry_hash<T>(a: &Entry<T>, b: &Entry<T>) -> Ordering {
    a.hash.cmp(&b.hash)
}

/// Default order: clock time, then clock id, then entry hash.
pub fn last_write_wins<T>(a: &Entry<T>, b: &Entry<T>) -> Ordering {
    sort_by_clocks(a, b, |a, b| sort_by_clock_ids(a, b, sort_by_entry_hash))
}

/// Comparator wrapper that treats `Equal` between distinct entries as a
/// configuration error.
pub struct NoZeroes<T> {
    inner: SortFn<T>,
}

impl<T> Clone for NoZeroes<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> NoZeroes<T> {
    pub fn new(inner: SortFn<T>) -> Self {
        Self { inner }
    }

    pub fn compare(&self, a: &Entry<T>, b: &Entry<T>) -> LogResult<Ordering> {
        if a.hash == b.hash {
            return Ok(Ordering::Equal);
        }
        match (self.inner)(a, b) {
            Ordering::Equal => Err(LogError::ZeroComparison {
                a: a.hash,
                b: b.hash,
            }),
            other => Ok(other),
        }
    }

    /// Sort ascending (earliest first).
    ///
    /// Ties are broken by hash while sorting so the slice order stays total;
    /// the first tie is then reported as an error.
    pub fn sort(&self, entries: &mut [Entry<T>]) -> LogResult<()> {
        let failure: Cell<Option<(orbit_types::Hash, orbit_types::Hash)>> = Cell::new(None);
        entries.sort_by(|a, b| {
            if a.hash == b.hash {
                return Ordering::Equal;
            }
            match (self.inner)(a, b) {
                Ordering::Equal => {
                    if failure.get().is_none() {
                        failure.set(Some((a.hash, b.hash)));
                    }
                    a.hash.cmp(&b.hash)
                }
                other => other,
            }
        });
        match failure.get() {
            Some((a, b)) => Err(LogError::ZeroComparison { a, b }),
            None => Ok(()),
        }
    }

    /// Sort descending (latest first).
    pub fn sort_latest_first(&self, entries: &mut [Entry<T>]) -> LogResult<()> {
        self.sort(entries)?;
        entries.reverse();
        Ok(())
    }
}

impl<T: 'static> Default for NoZeroes<T> {
    fn default() -> Self {
        Self::new(Arc::new(last_write_wins::<T>))
    }
}
