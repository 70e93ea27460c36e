use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orbit_log::{Entry, Log, Payload};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::codec::SyncCodec;
use crate::error::{SyncError, SyncResult};
use crate::message::{heads_protocol, SyncMessage};
use crate::network::{IncomingStream, NetStream, Network, PeerId, PubSubEvent};

pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 1024;

/// Notifications from a [`LogSync`] to its owner, delivered in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// Signed entry bytes received from a peer.
    Synced(Vec<u8>),
    /// A head exchange with `peer` completed.
    Join { peer: PeerId, heads: Vec<Vec<u8>> },
    Leave { peer: PeerId },
    /// A non-fatal failure while talking to a peer.
    Error(String),
}

struct Context<T: Payload> {
    log: Arc<Log<T>>,
    network: Arc<dyn Network>,
    protocol: String,
    timeout: Duration,
    peers: Mutex<HashSet<PeerId>>,
    events: mpsc::Sender<SyncEvent>,
    started: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
}

impl<T: Payload> Context<T> {
    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().expect("lock poisoned").spawn(task);
    }

    fn add_peer(&self, peer: &PeerId) -> bool {
        self.peers.lock().expect("lock poisoned").insert(peer.clone())
    }

    fn remove_peer(&self, peer: &PeerId) -> bool {
        self.peers.lock().expect("lock poisoned").remove(peer)
    }

    async fn emit(&self, event: SyncEvent) {
        // The owner dropping its receiver means nobody is listening.
        let _ = self.events.send(event).await;
    }

    async fn deliver(&self, peer: PeerId, heads: Vec<Vec<u8>>) {
        debug!(log = %self.log.id(), peer = %peer, heads = heads.len(), "exchanged heads");
        for bytes in &heads {
            self.emit(SyncEvent::Synced(bytes.clone())).await;
        }
        self.emit(SyncEvent::Join { peer, heads }).await;
    }

    async fn fail(&self, peer: &PeerId, error: SyncError) {
        self.remove_peer(peer);
        warn!(log = %self.log.id(), peer = %peer, error = %error, "head exchange failed");
        self.emit(SyncEvent::Error(error.to_string())).await;
    }

    /// Send local heads while reading the remote ones.
    async fn exchange(&self, stream: NetStream) -> SyncResult<Vec<Vec<u8>>> {
        let local = SyncMessage::Heads {
            log_id: self.log.id().to_string(),
            heads: self.log.heads()?.into_iter().map(|e| e.bytes).collect(),
        };
        let (mut reader, mut writer) = tokio::io::split(stream);
        let write = async {
            SyncCodec::write_frame(&mut writer, &local).await?;
            writer.shutdown().await?;
            Ok::<_, SyncError>(())
        };
        let read = SyncCodec::read_frame(&mut reader);
        let ((), remote) = tokio::try_join!(write, read)?;

        match remote {
            SyncMessage::Heads { log_id, heads } if log_id == self.log.id() => Ok(heads),
            SyncMessage::Heads { log_id, .. } => Err(SyncError::LogIdMismatch {
                expected: self.log.id().to_string(),
                actual: log_id,
            }),
        }
    }

    async fn dial_peer(self: Arc<Self>, peer: PeerId) {
        let attempt = async {
            let stream = self.network.dial(&peer, &self.protocol).await?;
            self.exchange(stream).await
        };
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(heads)) => self.deliver(peer, heads).await,
            Ok(Err(SyncError::UnsupportedProtocol(_))) => {
                debug!(peer = %peer, protocol = %self.protocol, "peer does not sync this log");
                self.remove_peer(&peer);
            }
            Ok(Err(e)) => self.fail(&peer, e).await,
            Err(_) => {
                let error = SyncError::Timeout { peer: peer.clone() };
                self.fail(&peer, error).await;
            }
        }
    }

    async fn accept(self: Arc<Self>, incoming: IncomingStream) {
        let IncomingStream { peer, stream } = incoming;
        self.add_peer(&peer);
        match tokio::time::timeout(self.timeout, self.exchange(stream)).await {
            Ok(Ok(heads)) => self.deliver(peer, heads).await,
            Ok(Err(e)) => self.fail(&peer, e).await,
            Err(_) => {
                let error = SyncError::Timeout { peer: peer.clone() };
                self.fail(&peer, error).await;
            }
        }
    }

    async fn on_pubsub(self: Arc<Self>, event: PubSubEvent) {
        match event {
            PubSubEvent::Message { from, data, .. } => {
                if from != *self.network.peer_id() {
                    self.emit(SyncEvent::Synced(data)).await;
                }
            }
            PubSubEvent::Subscribed { peer, .. } => {
                if self.add_peer(&peer) {
                    let ctx = self.clone();
                    self.spawn(ctx.dial_peer(peer));
                }
            }
            PubSubEvent::Unsubscribed { peer, .. } => {
                if self.remove_peer(&peer) {
                    debug!(log = %self.log.id(), peer = %peer, "peer left");
                    self.emit(SyncEvent::Leave { peer }).await;
                }
            }
        }
    }
}

/// Keeps one log in sync with every peer subscribed to its topic.
pub struct LogSync<T: Payload> {
    ctx: Arc<Context<T>>,
}

impl<T: Payload> LogSync<T> {
    /// Create a session for `log`. Events arrive on the returned receiver.
    pub fn new(
        log: Arc<Log<T>>,
        network: Arc<dyn Network>,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<SyncEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let protocol = heads_protocol(log.id());
        let ctx = Arc::new(Context {
            log,
            network,
            protocol,
            timeout,
            peers: Mutex::new(HashSet::new()),
            events,
            started: AtomicBool::new(false),
            tasks: Mutex::new(JoinSet::new()),
        });
        (Self { ctx }, rx)
    }

    pub fn protocol(&self) -> &str {
        &self.ctx.protocol
    }

    pub fn is_started(&self) -> bool {
        self.ctx.started.load(Ordering::SeqCst)
    }

    /// Peers currently known on the topic.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<_> = self
            .ctx
            .peers
            .lock()
            .expect("lock poisoned")
            .iter()
            .cloned()
            .collect();
        peers.sort();
        peers
    }

    /// Register the heads handler and join the log's topic.
    pub async fn start(&self) -> SyncResult<()> {
        if self.ctx.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let topic = self.ctx.log.id().to_string();
        // The handler must exist before peers learn of us and dial.
        let mut incoming = self.ctx.network.handle(&self.ctx.protocol).await?;
        let mut pubsub = self.ctx.network.subscribe(&topic).await?;

        let ctx = self.ctx.clone();
        self.ctx.spawn(async move {
            while let Some(stream) = incoming.recv().await {
                let session = ctx.clone();
                ctx.spawn(session.accept(stream));
            }
        });
        let ctx = self.ctx.clone();
        self.ctx.spawn(async move {
            while let Some(event) = pubsub.recv().await {
                ctx.clone().on_pubsub(event).await;
            }
        });
        info!(log = %topic, peer = %self.ctx.network.peer_id(), "sync started");
        Ok(())
    }

    /// Leave the topic, stop background work, and forget all peers.
    pub async fn stop(&self) -> SyncResult<()> {
        if !self.ctx.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let topic = self.ctx.log.id();
        self.ctx.network.unsubscribe(topic).await?;
        self.ctx.network.unhandle(&self.ctx.protocol).await?;
        let mut tasks = std::mem::take(&mut *self.ctx.tasks.lock().expect("lock poisoned"));
        tasks.shutdown().await;
        self.ctx.peers.lock().expect("lock poisoned").clear();
        info!(log = %topic, "sync stopped");
        Ok(())
    }

    /// Publish a new local entry to the topic.
    pub async fn add(&self, entry: &Entry<T>) -> SyncResult<()> {
        if !self.is_started() {
            return Ok(());
        }
        self.ctx
            .network
            .publish(self.ctx.log.id(), entry.bytes.clone())
            .await?;
        debug!(log = %self.ctx.log.id(), entry = %entry.hash.short_hex(), "published entry");
        Ok(())
    }
}

impl<T: Payload> std::fmt::Debug for LogSync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSync")
            .field("protocol", &self.ctx.protocol)
            .field("started", &self.is_started())
            .finish()
    }
}
