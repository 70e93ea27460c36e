use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::SyncResult;

pub type PeerId = String;

/// A bidirectional byte stream to a peer.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> Duplex for S {}

pub type NetStream = Box<dyn Duplex>;

/// Pub/sub notifications for one subscribed topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PubSubEvent {
    /// Data published on the topic by another peer.
    Message {
        topic: String,
        from: PeerId,
        data: Vec<u8>,
    },
    /// Another peer subscribed to the topic.
    Subscribed { topic: String, peer: PeerId },
    /// Another peer left the topic.
    Unsubscribed { topic: String, peer: PeerId },
}

/// A stream opened by a remote peer on a handled protocol.
pub struct IncomingStream {
    pub peer: PeerId,
    pub stream: NetStream,
}

/// The peer-to-peer substrate sync runs over: topic pub/sub plus
/// protocol-addressed direct streams.
#[async_trait]
pub trait Network: Send + Sync {
    fn peer_id(&self) -> &PeerId;

    /// Join `topic`. Events for it arrive on the returned channel until
    /// [`Network::unsubscribe`].
    async fn subscribe(&self, topic: &str) -> SyncResult<mpsc::Receiver<PubSubEvent>>;

    async fn unsubscribe(&self, topic: &str) -> SyncResult<()>;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> SyncResult<()>;

    /// Accept streams for `protocol`.
    async fn handle(&self, protocol: &str) -> SyncResult<mpsc::Receiver<IncomingStream>>;

    async fn unhandle(&self, protocol: &str) -> SyncResult<()>;

    /// Open a stream to `peer`. Fails with `UnsupportedProtocol` when the
    /// peer does not handle `protocol`.
    async fn dial(&self, peer: &PeerId, protocol: &str) -> SyncResult<NetStream>;
}
