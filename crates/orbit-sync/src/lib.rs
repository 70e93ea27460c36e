//! Replication of operation logs between peers.
//!
//! Peers meet on a pub/sub topic named after the log id. When a peer joins
//! the topic, both sides exchange their current heads over a direct stream;
//! afterwards every local append is published to the topic.

pub mod codec;
pub mod error;
pub mod memory;
pub mod message;
pub mod network;
pub mod sync;

pub use codec::SyncCodec;
pub use error::{SyncError, SyncResult};
pub use memory::{MemoryNetwork, MemoryPeer};
pub use message::{heads_protocol, SyncMessage, HEADS_PROTOCOL, MAX_MESSAGE_SIZE};
pub use network::{IncomingStream, NetStream, Network, PeerId, PubSubEvent};
pub use sync::{LogSync, SyncEvent, DEFAULT_SYNC_TIMEOUT};
