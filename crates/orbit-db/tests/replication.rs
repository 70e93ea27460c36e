//! Two or more `OrbitDb` instances sharing a block store and an in-memory
//! network, replicating databases between them.

use std::sync::Arc;
use std::time::Duration;

use orbit_db::{
    AccessControllerType, DatabaseEvent, DbError, KeyValueDb, OpenOptions, OrbitDb, OrbitDbConfig,
    Operation,
};
use orbit_log::{AllowAll, AppendOptions, Log, LogOptions};
use orbit_store::{BlockStore, MemoryBlockStore};
use orbit_sync::{MemoryNetwork, Network};
use serde_json::json;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(10);

struct Swarm {
    blocks: Arc<MemoryBlockStore>,
    network: MemoryNetwork,
}

impl Swarm {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            blocks: Arc::new(MemoryBlockStore::new()),
            network: MemoryNetwork::new(),
        }
    }

    fn node(&self, id: &str) -> OrbitDb {
        self.node_with(OrbitDbConfig::in_memory(id))
    }

    fn node_with(&self, config: OrbitDbConfig) -> OrbitDb {
        let blocks: Arc<dyn BlockStore> = self.blocks.clone();
        let peer = self.network.peer(config.id.clone());
        OrbitDb::new(config, blocks, peer).unwrap()
    }
}

/// Poll `check` until it holds or the wait runs out.
async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_matching(
    events: &mut broadcast::Receiver<DatabaseEvent>,
    mut pred: impl FnMut(&DatabaseEvent) -> bool,
) -> DatabaseEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received in time")
}

// ---- events ----

#[tokio::test]
async fn events_replicate_to_a_peer_opening_by_address() {
    let swarm = Swarm::new();
    let a = swarm.node("userA");
    let b = swarm.node("userB");

    let feed_a = a
        .open_events("feed", OpenOptions::default().with_write(["*"]))
        .await
        .unwrap();
    feed_a.add(json!("before b")).await.unwrap();

    let feed_b = b
        .open_events(&feed_a.address().to_string(), OpenOptions::default())
        .await
        .unwrap();
    assert_eq!(feed_b.name(), "feed");

    let mut events_b = feed_b.subscribe();
    let hash = feed_a.add(json!("after b")).await.unwrap();
    next_matching(&mut events_b, |e| matches!(e, DatabaseEvent::Update(entry) if entry.hash == hash)).await;

    eventually(|| feed_b.all().unwrap().len() == 2).await;
    let values: Vec<_> = feed_b.all().unwrap().into_iter().map(|e| e.value).collect();
    assert_eq!(values, vec![json!("before b"), json!("after b")]);
    eventually(|| feed_a.peers() == vec!["userB".to_string()]).await;

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_writers_converge() {
    let swarm = Swarm::new();
    let a = swarm.node("userA");
    let b = swarm.node("userB");

    let kv_a = a
        .open_keyvalue("shared", OpenOptions::default().with_write(["*"]))
        .await
        .unwrap();
    let kv_b = b
        .open_keyvalue(&kv_a.address().to_string(), OpenOptions::default())
        .await
        .unwrap();
    eventually(|| !kv_a.peers().is_empty() && !kv_b.peers().is_empty()).await;

    for i in 0..5 {
        kv_a.put(&format!("a{i}"), json!(i)).await.unwrap();
        kv_b.put(&format!("b{i}"), json!(i)).await.unwrap();
    }
    kv_a.put("both", json!("from a")).await.unwrap();
    kv_b.put("both", json!("from b")).await.unwrap();

    eventually(|| {
        kv_a.log().values().unwrap().len() == 12 && kv_b.log().values().unwrap().len() == 12
    })
    .await;
    let hashes = |kv: &KeyValueDb| -> Vec<_> {
        kv.log().values().unwrap().into_iter().map(|e| e.hash).collect()
    };
    assert_eq!(hashes(&kv_a), hashes(&kv_b));
    assert_eq!(kv_a.all().unwrap(), kv_b.all().unwrap());
    assert_eq!(kv_a.get("both").unwrap(), kv_b.get("both").unwrap());

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

// ---- access control ----

#[tokio::test]
async fn unlisted_writer_cannot_append_locally() {
    let swarm = Swarm::new();
    let a = swarm.node("userA");
    let b = swarm.node("userB");

    let feed_a = a.open_events("private", OpenOptions::default()).await.unwrap();
    let feed_b = b
        .open_events(&feed_a.address().to_string(), OpenOptions::default())
        .await
        .unwrap();
    let err = feed_b.add(json!("intrusion")).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Log(orbit_log::LogError::NotAllowed { .. })
    ));
    assert!(feed_b.all().unwrap().is_empty());

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn forged_remote_entry_is_rejected() {
    let swarm = Swarm::new();
    let a = swarm.node("userA");
    let mallory = swarm.node("mallory");

    let feed_a = a.open_events("private", OpenOptions::default()).await.unwrap();
    let mut events_a = feed_a.subscribe();
    let topic = feed_a.address().to_string();

    // A log that skips access control, publishing straight onto the topic.
    let rogue: Log<Operation> = Log::open(
        mallory.identities().clone(),
        mallory.identity().clone(),
        LogOptions::default()
            .with_id(topic.clone())
            .with_access(Arc::new(AllowAll)),
    )
    .unwrap();
    let entry = rogue
        .append(Operation::add(json!("forged")), AppendOptions::default())
        .await
        .unwrap();
    let peer = swarm.network.peer("mallory-raw");
    peer.publish(&topic, entry.bytes.clone()).await.unwrap();

    next_matching(&mut events_a, |e| matches!(e, DatabaseEvent::Error(_))).await;
    assert!(feed_a.all().unwrap().is_empty());
    assert!(!feed_a.log().has(&entry.hash).unwrap());

    a.stop().await.unwrap();
}

#[tokio::test]
async fn granted_capability_lets_a_peer_write() {
    let swarm = Swarm::new();
    let a = swarm.node("userA");
    let b = swarm.node("userB");

    let kv_a = a
        .open_keyvalue(
            "guarded",
            OpenOptions::default().with_access(AccessControllerType::Capability),
        )
        .await
        .unwrap();
    let kv_b = b
        .open_keyvalue(&kv_a.address().to_string(), OpenOptions::default())
        .await
        .unwrap();
    assert!(kv_b.put("k", json!("denied")).await.is_err());

    let caps_a = kv_a.access().as_capability().unwrap().clone();
    let caps_b = kv_b.access().as_capability().unwrap().clone();
    let b_id = b.identity().id.clone();
    caps_a.grant("write", &b_id).await.unwrap();
    eventually(|| {
        caps_b
            .capabilities()
            .unwrap()
            .get("write")
            .is_some_and(|ids| ids.contains(&b_id))
    })
    .await;

    let hash = kv_b.put("k", json!("allowed")).await.unwrap();
    eventually(|| kv_a.log().has(&hash).unwrap()).await;
    assert_eq!(kv_a.get("k").unwrap(), Some(json!("allowed")));

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

// ---- indexed view ----

#[tokio::test]
async fn indexed_view_agrees_with_replay_after_replication() {
    let swarm = Swarm::new();
    let a = swarm.node("userA");
    let b = swarm.node("userB");

    let indexed = a
        .open_keyvalue_indexed("kv", OpenOptions::default().with_write(["*"]))
        .await
        .unwrap();
    let address = indexed.address().to_string();
    let writer = b.open_keyvalue_indexed(&address, OpenOptions::default()).await.unwrap();
    eventually(|| !indexed.peers().is_empty()).await;

    writer.put("k", json!("v1")).await.unwrap();
    writer.put("k", json!("v2")).await.unwrap();
    writer.del("k").await.unwrap();
    let last = writer.put("k", json!("v3")).await.unwrap();
    writer.put("gone", json!(true)).await.unwrap();
    let gone = writer.del("gone").await.unwrap();
    indexed.put("local", json!(1)).await.unwrap();

    eventually(|| indexed.log().has(&last).unwrap() && indexed.log().has(&gone).unwrap()).await;
    assert_eq!(indexed.get("k").unwrap(), Some(json!("v3")));
    assert_eq!(indexed.get("gone").unwrap(), None);

    let replay = Replayed::new(&indexed);
    for key in ["k", "gone", "local"] {
        assert_eq!(indexed.get(key).unwrap(), replay.get(key), "key {key}");
    }

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

/// Full replay of an indexed database's log.
struct Replayed {
    values: std::collections::HashMap<String, serde_json::Value>,
}

impl Replayed {
    fn new(db: &orbit_db::KeyValueIndexedDb) -> Self {
        let mut values = std::collections::HashMap::new();
        for entry in db.log().values().unwrap() {
            let Some(key) = entry.payload.keyed().map(str::to_string) else {
                continue;
            };
            match entry.payload.value {
                Some(value) if entry.payload.op == orbit_db::OpKind::Put => {
                    values.insert(key, value);
                }
                _ => {
                    values.remove(&key);
                }
            }
        }
        Self { values }
    }

    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }
}

// ---- persistence ----

#[tokio::test]
async fn reopen_from_disk_restores_state() {
    let dir = tempfile::tempdir().unwrap();
    let swarm = Swarm::new();
    let config = OrbitDbConfig {
        directory: Some(dir.path().to_path_buf()),
        ..OrbitDbConfig::in_memory("userA")
    };

    let address = {
        let orbit = swarm.node_with(config.clone());
        let kv = orbit
            .open_keyvalue_indexed("settings", OpenOptions::default().with_sync(false))
            .await
            .unwrap();
        kv.put("theme", json!("dark")).await.unwrap();
        kv.put("lang", json!("en")).await.unwrap();
        kv.del("lang").await.unwrap();
        let address = kv.address().to_string();
        orbit.stop().await.unwrap();
        address
    };

    let orbit = swarm.node_with(config);
    let kv = orbit
        .open_keyvalue_indexed(&address, OpenOptions::default().with_sync(false))
        .await
        .unwrap();
    assert_eq!(kv.get("theme").unwrap(), Some(json!("dark")));
    assert_eq!(kv.get("lang").unwrap(), None);
    assert_eq!(kv.log().heads().unwrap().len(), 1);
    assert_eq!(kv.log().values().unwrap().len(), 3);
    orbit.stop().await.unwrap();
}
