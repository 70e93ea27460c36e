//! Access controllers for databases.
//!
//! Controllers are addressed as `/<type>/<hash>`; the type segment selects
//! the implementation when a database is reopened from its manifest.

mod capability;
mod static_access;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use orbit_identity::Identities;
use orbit_log::{AccessController, Entry, LogResult};
use orbit_types::Hash;

use crate::config::AccessOptions;
use crate::context::DbContext;
use crate::error::{DbError, DbResult};
use crate::operation::Operation;

pub use capability::CapabilityAccessController;
pub use static_access::StaticAccessController;

/// Write-list entry that admits every identity.
pub const WILDCARD: &str = "*";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccessControllerType {
    #[default]
    Static,
    Capability,
}

impl AccessControllerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Capability => "capability",
        }
    }

    /// Split `/<type>/<hash>` into its parts.
    pub fn parse_address(address: &str) -> DbResult<(Self, Hash)> {
        let mut parts = address.trim_start_matches('/').splitn(2, '/');
        let (Some(tag), Some(hash)) = (parts.next(), parts.next()) else {
            return Err(DbError::UnknownAccessController(address.to_string()));
        };
        Ok((tag.parse()?, Hash::parse(hash)?))
    }

    pub fn address(&self, hash: &Hash) -> String {
        format!("/{}/{}", self.as_str(), hash)
    }
}

impl fmt::Display for AccessControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessControllerType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "capability" => Ok(Self::Capability),
            other => Err(DbError::UnknownAccessController(other.to_string())),
        }
    }
}

/// The access controller of an open database.
#[derive(Clone)]
pub enum Access {
    Static(Arc<StaticAccessController>),
    Capability(Arc<CapabilityAccessController>),
}

impl Access {
    /// Persist a controller as described by `options` and return its
    /// address without opening it. An empty write list admits only the
    /// context identity.
    pub fn store(ctx: &DbContext, name: &str, options: &AccessOptions) -> DbResult<String> {
        let write = if options.write.is_empty() {
            vec![ctx.identity.id.clone()]
        } else {
            options.write.clone()
        };
        Ok(match options.ac_type {
            AccessControllerType::Static => StaticAccessController::create(ctx, write)?.address(),
            AccessControllerType::Capability => AccessControllerType::Capability
                .address(&CapabilityAccessController::store(ctx, name, write)?),
        })
    }

    /// Persist and open a new controller.
    pub async fn create(ctx: &DbContext, name: &str, options: &AccessOptions) -> DbResult<Self> {
        let address = Self::store(ctx, name, options)?;
        Self::resolve(ctx, &address).await
    }

    /// Load the controller stored at `address`.
    pub async fn resolve(ctx: &DbContext, address: &str) -> DbResult<Self> {
        let (ac_type, hash) = AccessControllerType::parse_address(address)?;
        match ac_type {
            AccessControllerType::Static => Ok(Self::Static(Arc::new(
                StaticAccessController::open(ctx, &hash)?,
            ))),
            AccessControllerType::Capability => Ok(Self::Capability(Arc::new(
                CapabilityAccessController::open(ctx, &hash).await?,
            ))),
        }
    }

    pub fn ac_type(&self) -> AccessControllerType {
        match self {
            Self::Static(_) => AccessControllerType::Static,
            Self::Capability(_) => AccessControllerType::Capability,
        }
    }

    pub fn address(&self) -> String {
        match self {
            Self::Static(ac) => ac.address(),
            Self::Capability(ac) => ac.address(),
        }
    }

    /// The controller as the log sees it.
    pub fn controller(&self) -> Arc<dyn AccessController<Operation>> {
        match self {
            Self::Static(ac) => ac.clone(),
            Self::Capability(ac) => ac.clone(),
        }
    }

    pub fn as_capability(&self) -> Option<&Arc<CapabilityAccessController>> {
        match self {
            Self::Capability(ac) => Some(ac),
            Self::Static(_) => None,
        }
    }

    pub async fn close(&self) -> DbResult<()> {
        Ok(self.controller().close().await?)
    }

    pub async fn drop_state(&self) -> DbResult<()> {
        Ok(self.controller().drop_state().await?)
    }
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Access").field(&self.address()).finish()
    }
}

/// Resolve the entry's signer and check it against `allowed`, then verify
/// the identity itself.
pub(crate) fn writer_allowed(
    identities: &Identities,
    entry: &Entry<Operation>,
    allowed: impl Fn(&str) -> bool,
) -> LogResult<bool> {
    let Some(identity) = identities.get_identity(&entry.identity)? else {
        return Ok(false);
    };
    if identity.public_key != entry.key {
        return Ok(false);
    }
    if !allowed(&identity.id) && !allowed(WILDCARD) {
        return Ok(false);
    }
    Ok(identities.verify_identity(&identity)?)
}
