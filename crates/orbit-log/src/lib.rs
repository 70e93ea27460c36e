//! Signed, content-addressed operation log.
//!
//! A [`Log`] is a Merkle DAG of [`Entry`] values. Each entry names its
//! predecessors by hash (`next`), carries a Lamport [`Clock`](orbit_types::Clock),
//! and is signed by an [`Identity`](orbit_identity::Identity). Logs on
//! different peers converge by [`Log::join`]: the union of entry sets, with
//! the heads recomputed and order fixed by a deterministic comparator.
//!
//! # Invariants
//!
//! - An entry's hash is a pure function of its content.
//! - Every entry reachable from a head is retrievable from entry storage.
//! - The index holds exactly the hashes that have been merged.
//! - Nothing is merged unless it passed access control and signature checks.

pub mod access;
pub mod conflict;
pub mod entry;
pub mod error;
pub mod heads;
pub mod log;

pub use access::{AccessController, AllowAll};
pub use conflict::{last_write_wins, NoZeroes, SortFn};
pub use entry::{Entry, Payload, ENTRY_VERSION};
pub use error::{LogError, LogResult};
pub use heads::{find_heads, Heads};
pub use log::{AppendOptions, IteratorOptions, Log, LogIterator, LogOptions, Traversal};
