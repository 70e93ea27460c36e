use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{SyncError, SyncResult};
use crate::network::{IncomingStream, NetStream, Network, PeerId, PubSubEvent};

const CHANNEL_CAPACITY: usize = 256;
const STREAM_BUFFER: usize = 64 * 1024;

#[derive(Default)]
struct Hub {
    topics: HashMap<String, HashMap<PeerId, mpsc::Sender<PubSubEvent>>>,
    handlers: HashMap<PeerId, HashMap<String, mpsc::Sender<IncomingStream>>>,
}

/// An in-process network. Peers created from the same `MemoryNetwork` can
/// see each other's topics and dial each other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self, id: impl Into<PeerId>) -> Arc<MemoryPeer> {
        Arc::new(MemoryPeer {
            id: id.into(),
            hub: self.hub.clone(),
        })
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryPeer {
    id: PeerId,
    hub: Arc<Mutex<Hub>>,
}

impl MemoryPeer {
    fn subscribers_except_self(&self, topic: &str) -> Vec<mpsc::Sender<PubSubEvent>> {
        let hub = self.hub.lock().expect("lock poisoned");
        hub.topics
            .get(topic)
            .map(|subs| {
                subs.iter()
                    .filter(|(peer, _)| **peer != self.id)
                    .map(|(_, tx)| tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn notify(targets: Vec<mpsc::Sender<PubSubEvent>>, event: PubSubEvent) {
        for tx in targets {
            // A closed receiver is a subscriber going away.
            let _ = tx.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl Network for MemoryPeer {
    fn peer_id(&self) -> &PeerId {
        &self.id
    }

    async fn subscribe(&self, topic: &str) -> SyncResult<mpsc::Receiver<PubSubEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let others = self.subscribers_except_self(topic);
        self.hub
            .lock()
            .expect("lock poisoned")
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(self.id.clone(), tx);
        Self::notify(
            others,
            PubSubEvent::Subscribed {
                topic: topic.to_string(),
                peer: self.id.clone(),
            },
        )
        .await;
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> SyncResult<()> {
        let removed = {
            let mut hub = self.hub.lock().expect("lock poisoned");
            let removed = hub
                .topics
                .get_mut(topic)
                .and_then(|subs| subs.remove(&self.id))
                .is_some();
            if hub.topics.get(topic).is_some_and(|subs| subs.is_empty()) {
                hub.topics.remove(topic);
            }
            removed
        };
        if removed {
            Self::notify(
                self.subscribers_except_self(topic),
                PubSubEvent::Unsubscribed {
                    topic: topic.to_string(),
                    peer: self.id.clone(),
                },
            )
            .await;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> SyncResult<()> {
        Self::notify(
            self.subscribers_except_self(topic),
            PubSubEvent::Message {
                topic: topic.to_string(),
                from: self.id.clone(),
                data,
            },
        )
        .await;
        Ok(())
    }

    async fn handle(&self, protocol: &str) -> SyncResult<mpsc::Receiver<IncomingStream>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.hub
            .lock()
            .expect("lock poisoned")
            .handlers
            .entry(self.id.clone())
            .or_default()
            .insert(protocol.to_string(), tx);
        Ok(rx)
    }

    async fn unhandle(&self, protocol: &str) -> SyncResult<()> {
        let mut hub = self.hub.lock().expect("lock poisoned");
        if let Some(protocols) = hub.handlers.get_mut(&self.id) {
            protocols.remove(protocol);
        }
        Ok(())
    }

    async fn dial(&self, peer: &PeerId, protocol: &str) -> SyncResult<NetStream> {
        let handler = {
            let hub = self.hub.lock().expect("lock poisoned");
            let known = hub.handlers.contains_key(peer)
                || hub.topics.values().any(|subs| subs.contains_key(peer));
            if !known {
                return Err(SyncError::Unreachable {
                    peer: peer.clone(),
                    reason: "unknown peer".into(),
                });
            }
            hub.handlers
                .get(peer)
                .and_then(|protocols| protocols.get(protocol))
                .cloned()
        };
        let handler = handler.ok_or_else(|| SyncError::UnsupportedProtocol(protocol.to_string()))?;

        let (local, remote) = tokio::io::duplex(STREAM_BUFFER);
        handler
            .send(IncomingStream {
                peer: self.id.clone(),
                stream: Box::new(remote),
            })
            .await
            .map_err(|_| SyncError::UnsupportedProtocol(protocol.to_string()))?;
        Ok(Box::new(local))
    }
}
