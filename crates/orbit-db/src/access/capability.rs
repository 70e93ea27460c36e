use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use orbit_identity::Identities;
use orbit_log::{AccessController, Entry, LogError, LogResult};
use orbit_types::{Address, Hash};
use serde_json::Value;
use tracing::info;

use super::{writer_allowed, Access, AccessControllerType, StaticAccessController};
use crate::config::{DatabaseType, OpenOptions};
use crate::context::DbContext;
use crate::error::{DbError, DbResult};
use crate::keyvalue::KeyValueDb;
use crate::manifest::Manifest;
use crate::operation::Operation;

/// Capability allowing appends to the governed database.
pub const WRITE: &str = "write";
/// Capability allowing appends and changes to the capability table.
pub const ADMIN: &str = "admin";

/// A mutable write list kept in its own key-value database.
///
/// The backing database maps a capability name to a JSON array of
/// identity ids and is itself guarded by a static controller holding the
/// creation-time write list, so only admins can grant or revoke.
pub struct CapabilityAccessController {
    address: String,
    db: KeyValueDb,
    admins: Vec<String>,
    identities: Arc<Identities>,
}

impl CapabilityAccessController {
    /// Persist the backing database's manifest and static controller.
    /// Returns the hash this controller is addressed by.
    pub(crate) fn store(ctx: &DbContext, name: &str, write: Vec<String>) -> DbResult<Hash> {
        let backing = StaticAccessController::create(ctx, write)?;
        let manifest = Manifest::new(
            format!("{name}/_access"),
            DatabaseType::KeyValue,
            backing.address(),
            None,
        );
        manifest.store(&ctx.manifests())
    }

    pub async fn create(ctx: &DbContext, name: &str, write: Vec<String>) -> DbResult<Self> {
        let hash = Self::store(ctx, name, write)?;
        Self::open(ctx, &hash).await
    }

    pub async fn open(ctx: &DbContext, hash: &Hash) -> DbResult<Self> {
        let manifest = Manifest::load(&ctx.manifests(), hash)?;
        let (ac_type, ac_hash) = AccessControllerType::parse_address(&manifest.access_controller)?;
        if ac_type != AccessControllerType::Static {
            return Err(DbError::TypeMismatch {
                expected: AccessControllerType::Static.to_string(),
                actual: ac_type.to_string(),
            });
        }
        let backing = StaticAccessController::open(ctx, &ac_hash)?;
        let admins = backing.write().to_vec();
        let db = KeyValueDb::open(
            ctx,
            Address::new(*hash),
            &manifest,
            Access::Static(Arc::new(backing)),
            &OpenOptions::default(),
        )
        .await?;
        Ok(Self {
            address: AccessControllerType::Capability.address(hash),
            db,
            admins,
            identities: ctx.identities.clone(),
        })
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    /// The key-value database holding the capability table.
    pub fn database(&self) -> &KeyValueDb {
        &self.db
    }

    /// Current capability table. Creation-time admins always hold `admin`.
    pub fn capabilities(&self) -> DbResult<BTreeMap<String, BTreeSet<String>>> {
        let mut caps: BTreeMap<String, BTreeSet<String>> = self
            .db
            .iterator(None)?
            .into_iter()
            .map(|record| (record.key, members(&record.value)))
            .collect();
        caps.entry(ADMIN.to_string())
            .or_default()
            .extend(self.admins.iter().cloned());
        Ok(caps)
    }

    pub async fn grant(&self, capability: &str, id: &str) -> DbResult<()> {
        let mut ids = self.current(capability)?;
        if ids.insert(id.to_string()) {
            self.db.put(capability, to_value(&ids)).await?;
            info!(address = %self.address, capability, id, "granted capability");
        }
        Ok(())
    }

    pub async fn revoke(&self, capability: &str, id: &str) -> DbResult<()> {
        let mut ids = self.current(capability)?;
        if !ids.remove(id) {
            return Ok(());
        }
        if ids.is_empty() {
            self.db.del(capability).await?;
        } else {
            self.db.put(capability, to_value(&ids)).await?;
        }
        info!(address = %self.address, capability, id, "revoked capability");
        Ok(())
    }

    fn current(&self, capability: &str) -> DbResult<BTreeSet<String>> {
        Ok(self
            .db
            .get(capability)?
            .map(|value| members(&value))
            .unwrap_or_default())
    }
}

fn members(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn to_value(ids: &BTreeSet<String>) -> Value {
    Value::Array(ids.iter().cloned().map(Value::String).collect())
}

fn access_error(e: DbError) -> LogError {
    LogError::Access(e.to_string())
}

#[async_trait]
impl AccessController<Operation> for CapabilityAccessController {
    fn ac_type(&self) -> &str {
        AccessControllerType::Capability.as_str()
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn can_append(&self, entry: &Entry<Operation>) -> LogResult<bool> {
        let caps = self.capabilities().map_err(access_error)?;
        let holds = |cap: &str, id: &str| caps.get(cap).is_some_and(|ids| ids.contains(id));
        writer_allowed(&self.identities, entry, |id| {
            holds(WRITE, id) || holds(ADMIN, id)
        })
    }

    async fn close(&self) -> LogResult<()> {
        self.db.close().await.map_err(access_error)
    }

    async fn drop_state(&self) -> LogResult<()> {
        self.db.drop().await.map_err(access_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, context_sharing};
    use serde_json::json;

    fn entry_by(ctx: &DbContext) -> Entry<Operation> {
        Entry::create(
            &ctx.identities,
            &ctx.identity,
            "/orbitdb/f00",
            Operation::add(json!(1)),
            None,
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn creator_is_admin() {
        let ctx = context("userA");
        let ac = CapabilityAccessController::create(&ctx, "db", vec![ctx.identity.id.clone()])
            .await
            .unwrap();
        let caps = ac.capabilities().unwrap();
        assert!(caps[ADMIN].contains(&ctx.identity.id));
        assert!(ac.can_append(&entry_by(&ctx)).await.unwrap());
        assert!(ac.address().starts_with("/capability/"));
    }

    #[tokio::test]
    async fn grant_then_revoke_write() {
        let ctx = context("userA");
        let other = context_sharing(&ctx, "userB");
        let ac = CapabilityAccessController::create(&ctx, "db", vec![ctx.identity.id.clone()])
            .await
            .unwrap();
        assert!(!ac.can_append(&entry_by(&other)).await.unwrap());

        ac.grant(WRITE, &other.identity.id).await.unwrap();
        assert!(ac.can_append(&entry_by(&other)).await.unwrap());
        assert!(ac.capabilities().unwrap()[WRITE].contains(&other.identity.id));

        ac.revoke(WRITE, &other.identity.id).await.unwrap();
        assert!(!ac.can_append(&entry_by(&other)).await.unwrap());
        assert!(!ac.capabilities().unwrap().contains_key(WRITE));
    }

    #[tokio::test]
    async fn creator_admin_cannot_be_revoked() {
        let ctx = context("userA");
        let ac = CapabilityAccessController::create(&ctx, "db", vec![ctx.identity.id.clone()])
            .await
            .unwrap();
        ac.revoke(ADMIN, &ctx.identity.id).await.unwrap();
        assert!(ac.capabilities().unwrap()[ADMIN].contains(&ctx.identity.id));
        assert!(ac.can_append(&entry_by(&ctx)).await.unwrap());
    }

    #[tokio::test]
    async fn granted_admin_can_be_revoked() {
        let ctx = context("userA");
        let other = context_sharing(&ctx, "userB");
        let ac = CapabilityAccessController::create(&ctx, "db", vec![ctx.identity.id.clone()])
            .await
            .unwrap();
        ac.grant(ADMIN, &other.identity.id).await.unwrap();
        assert!(ac.capabilities().unwrap()[ADMIN].contains(&other.identity.id));
        assert!(ac.can_append(&entry_by(&other)).await.unwrap());

        ac.revoke(ADMIN, &other.identity.id).await.unwrap();
        let caps = ac.capabilities().unwrap();
        assert!(!caps[ADMIN].contains(&other.identity.id));
        assert!(caps[ADMIN].contains(&ctx.identity.id));
        assert!(!ac.can_append(&entry_by(&other)).await.unwrap());
    }

    #[tokio::test]
    async fn non_admin_cannot_grant() {
        let ctx = context("userA");
        let ac = CapabilityAccessController::create(&ctx, "db", vec!["admin-only".into()])
            .await
            .unwrap();
        let err = ac.grant(WRITE, &ctx.identity.id).await.unwrap_err();
        assert!(matches!(err, DbError::Log(LogError::NotAllowed { .. })));
    }

    #[tokio::test]
    async fn reopen_sees_granted_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context("userA");
        ctx.config.directory = Some(dir.path().to_path_buf());
        let ac = CapabilityAccessController::create(&ctx, "db", vec![ctx.identity.id.clone()])
            .await
            .unwrap();
        ac.grant(WRITE, "userC").await.unwrap();
        ac.grant(WRITE, "userD").await.unwrap();
        ac.revoke(WRITE, "userC").await.unwrap();
        AccessController::close(&ac).await.unwrap();

        let (_, hash) = AccessControllerType::parse_address(&ac.address()).unwrap();
        let reopened = CapabilityAccessController::open(&ctx, &hash).await.unwrap();
        let caps = reopened.capabilities().unwrap();
        assert_eq!(caps[WRITE], BTreeSet::from(["userD".to_string()]));
    }

    #[test]
    fn members_ignores_non_strings() {
        assert_eq!(
            members(&json!(["a", 1, null, "b"])),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert!(members(&json!({"a": 1})).is_empty());
    }
}
