//! Layered key-value storage for the Orbit replicated log.
//!
//! Every log keeps three stores (entries, heads, index) and every identity
//! and manifest lives in a fourth. All of them are reached through the
//! [`Storage`] trait, so tiers can be mixed freely.
//!
//! # Storage Backends
//!
//! - [`MemoryStorage`] -- `HashMap`-based store for tests and ephemeral databases
//! - [`LruStorage`] -- bounded least-recently-used cache
//! - [`RedbStorage`] -- persistent ordered key-value file
//! - [`BlockStorage`] -- adapter over an external content-addressed [`BlockStore`]
//! - [`ComposedStorage`] -- two tiers, reads fall through and backfill
//!
//! # Design Rules
//!
//! 1. A miss is `Ok(None)`, never an error.
//! 2. Operations are atomic per key; no cross-key locks are held.
//! 3. The store never interprets values -- it is a pure key-value store.
//! 4. All backend errors are propagated, never silently ignored.

pub mod block;
pub mod cache;
pub mod composed;
pub mod error;
pub mod memory;
pub mod persistent;
pub mod traits;

pub use block::{BlockStorage, BlockStore, MemoryBlockStore};
pub use cache::{LruStorage, DEFAULT_LRU_CAPACITY};
pub use composed::ComposedStorage;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStorage;
pub use persistent::RedbStorage;
pub use traits::Storage;
