use std::sync::Arc;

use async_trait::async_trait;
use orbit_crypto::ContentHasher;
use orbit_identity::Identities;
use orbit_log::{AccessController, Entry, LogResult};
use orbit_types::Hash;
use serde::{Deserialize, Serialize};

use super::{writer_allowed, AccessControllerType};
use crate::context::DbContext;
use crate::error::{DbError, DbResult};
use crate::operation::Operation;

/// Persisted configuration of a static controller.
#[derive(Debug, Serialize, Deserialize)]
struct AccessManifest {
    #[serde(rename = "type")]
    ac_type: String,
    write: Vec<String>,
}

/// A fixed write list, stored content-addressed at creation.
pub struct StaticAccessController {
    address: String,
    write: Vec<String>,
    identities: Arc<Identities>,
}

impl StaticAccessController {
    pub fn create(ctx: &DbContext, write: Vec<String>) -> DbResult<Self> {
        let manifest = AccessManifest {
            ac_type: AccessControllerType::Static.as_str().to_string(),
            write,
        };
        let hash = ctx.manifests().put(&ContentHasher::ACCESS, &manifest)?;
        Ok(Self {
            address: AccessControllerType::Static.address(&hash),
            write: manifest.write,
            identities: ctx.identities.clone(),
        })
    }

    pub fn open(ctx: &DbContext, hash: &Hash) -> DbResult<Self> {
        let manifest: AccessManifest = ctx
            .manifests()
            .get(&ContentHasher::ACCESS, hash)?
            .ok_or(DbError::ManifestNotFound(*hash))?;
        if manifest.ac_type != AccessControllerType::Static.as_str() {
            return Err(DbError::TypeMismatch {
                expected: AccessControllerType::Static.to_string(),
                actual: manifest.ac_type,
            });
        }
        Ok(Self {
            address: AccessControllerType::Static.address(hash),
            write: manifest.write,
            identities: ctx.identities.clone(),
        })
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    pub fn write(&self) -> &[String] {
        &self.write
    }
}

#[async_trait]
impl AccessController<Operation> for StaticAccessController {
    fn ac_type(&self) -> &str {
        AccessControllerType::Static.as_str()
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn can_append(&self, entry: &Entry<Operation>) -> LogResult<bool> {
        writer_allowed(&self.identities, entry, |id| self.write.iter().any(|w| w == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::WILDCARD;
    use crate::testing::{context, context_sharing};
    use orbit_identity::ProviderType;
    use serde_json::json;

    fn entry_by(ctx: &DbContext) -> Entry<Operation> {
        Entry::create(
            &ctx.identities,
            &ctx.identity,
            "/orbitdb/f00",
            Operation::put("k", json!(1)),
            None,
            vec![],
            vec![],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn listed_writer_is_allowed() {
        let ctx = context("userA");
        let ac = StaticAccessController::create(&ctx, vec![ctx.identity.id.clone()]).unwrap();
        assert!(ac.can_append(&entry_by(&ctx)).await.unwrap());
    }

    #[tokio::test]
    async fn unlisted_writer_is_refused() {
        let ctx = context("userA");
        let other = context_sharing(&ctx, "userB");
        let ac = StaticAccessController::create(&ctx, vec![ctx.identity.id.clone()]).unwrap();
        assert!(!ac.can_append(&entry_by(&other)).await.unwrap());
    }

    #[tokio::test]
    async fn wildcard_admits_anyone() {
        let ctx = context("userA");
        let other = context_sharing(&ctx, "userB");
        let ac = StaticAccessController::create(&ctx, vec![WILDCARD.into()]).unwrap();
        assert!(ac.can_append(&entry_by(&other)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_identity_is_refused() {
        let ctx = context("userA");
        let ac = StaticAccessController::create(&ctx, vec!["*".into()]).unwrap();
        let mut entry = entry_by(&ctx);
        entry.identity = Hash::from_bytes(b"stranger");
        assert!(!ac.can_append(&entry).await.unwrap());
    }

    #[tokio::test]
    async fn borrowed_identity_is_refused() {
        let ctx = context("userA");
        let ac = StaticAccessController::create(&ctx, vec![ctx.identity.id.clone()]).unwrap();
        let impostor = ctx
            .identities
            .create_identity("mallory", ProviderType::PublicKey)
            .unwrap();
        let mut entry = Entry::create(
            &ctx.identities,
            &impostor,
            "/orbitdb/f00",
            Operation::add(json!(1)),
            None,
            vec![],
            vec![],
        )
        .unwrap();
        entry.identity = ctx.identity.hash;
        assert!(!ac.can_append(&entry).await.unwrap());
    }

    #[test]
    fn reopen_from_address() {
        let ctx = context("userA");
        let ac = StaticAccessController::create(&ctx, vec!["a".into(), "b".into()]).unwrap();
        let (ac_type, hash) = AccessControllerType::parse_address(&ac.address()).unwrap();
        assert_eq!(ac_type, AccessControllerType::Static);
        let reopened = StaticAccessController::open(&ctx, &hash).unwrap();
        assert_eq!(reopened.write(), ac.write());
        assert_eq!(reopened.address(), ac.address());
    }
}
