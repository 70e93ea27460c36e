//! Replicated databases over the Orbit operation log.
//!
//! A database is a signed [`Log`](orbit_log::Log) of [`Operation`]s, an
//! access controller deciding who may append, and a sync session that
//! exchanges heads with peers. Typed views interpret the log:
//!
//! - [`EventsDb`] -- append-only feed
//! - [`DocumentsDb`] -- JSON documents keyed by a field
//! - [`KeyValueDb`] -- last-write-wins map, resolved by replay
//! - [`KeyValueIndexedDb`] -- the same map, answered from a persisted index
//!
//! Databases are opened through [`OrbitDb`], by name (creating a manifest)
//! or by `/orbitdb/<hash>` address (resolving one).

pub mod access;
pub mod config;
pub mod context;
pub mod database;
pub mod documents;
pub mod error;
pub mod events;
pub mod keyvalue;
pub mod keyvalue_indexed;
pub mod manifest;
pub mod operation;
pub mod orbitdb;
pub mod replay;
pub mod store;

pub use access::{
    Access, AccessControllerType, CapabilityAccessController, StaticAccessController, WILDCARD,
};
pub use config::{AccessOptions, DatabaseType, OpenOptions, OrbitDbConfig};
pub use context::DbContext;
pub use database::{Database, DatabaseEvent, UpdateHook};
pub use documents::{DocumentsDb, DEFAULT_INDEX_BY};
pub use error::{DbError, DbResult};
pub use events::{EventRecord, EventsDb};
pub use keyvalue::KeyValueDb;
pub use keyvalue_indexed::KeyValueIndexedDb;
pub use manifest::{ContentStore, Manifest};
pub use operation::{OpKind, Operation};
pub use orbitdb::OrbitDb;
pub use replay::Record;
pub use store::Store;
