//! Foundation types for the Orbit replicated operation log.
//!
//! Every other Orbit crate depends on `orbit-types`.
//!
//! # Key Types
//!
//! - [`Hash`] -- Content-derived identifier (BLAKE3), rendered as multibase base16
//! - [`Clock`] -- Lamport clock used to order log entries
//! - [`Address`] -- Database address of the form `/orbitdb/<hash>`

pub mod address;
pub mod clock;
pub mod error;
pub mod hash;

pub use address::Address;
pub use clock::Clock;
pub use error::TypeError;
pub use hash::Hash;
