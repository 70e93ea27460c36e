use std::sync::Arc;

use orbit_types::Address;

use crate::access::Access;
use crate::config::{DatabaseType, OpenOptions};
use crate::context::DbContext;
use crate::database::Database;
use crate::documents::DocumentsDb;
use crate::error::DbResult;
use crate::events::EventsDb;
use crate::keyvalue::KeyValueDb;
use crate::keyvalue_indexed::KeyValueIndexedDb;
use crate::manifest::Manifest;

/// An open database of any type.
#[derive(Clone, Debug)]
pub enum Store {
    Events(EventsDb),
    Documents(DocumentsDb),
    KeyValue(KeyValueDb),
    KeyValueIndexed(KeyValueIndexedDb),
}

impl Store {
    /// Open the view matching the manifest's type.
    pub(crate) async fn open(
        ctx: &DbContext,
        address: Address,
        manifest: &Manifest,
        access: Access,
        options: &OpenOptions,
    ) -> DbResult<Self> {
        Ok(match manifest.database_type()? {
            DatabaseType::Events => {
                Self::Events(EventsDb::open(ctx, address, manifest, access, options).await?)
            }
            DatabaseType::Documents => {
                Self::Documents(DocumentsDb::open(ctx, address, manifest, access, options).await?)
            }
            DatabaseType::KeyValue => {
                Self::KeyValue(KeyValueDb::open(ctx, address, manifest, access, options).await?)
            }
            DatabaseType::KeyValueIndexed => Self::KeyValueIndexed(
                KeyValueIndexedDb::open(ctx, address, manifest, access, options).await?,
            ),
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        match self {
            Self::Events(db) => db.database(),
            Self::Documents(db) => db.database(),
            Self::KeyValue(db) => db.database(),
            Self::KeyValueIndexed(db) => db.database(),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.database().db_type()
    }

    pub fn address(&self) -> &Address {
        self.database().address()
    }

    pub fn as_events(&self) -> Option<&EventsDb> {
        match self {
            Self::Events(db) => Some(db),
            _ => None,
        }
    }

    pub fn as_documents(&self) -> Option<&DocumentsDb> {
        match self {
            Self::Documents(db) => Some(db),
            _ => None,
        }
    }

    pub fn as_keyvalue(&self) -> Option<&KeyValueDb> {
        match self {
            Self::KeyValue(db) => Some(db),
            _ => None,
        }
    }

    pub fn as_keyvalue_indexed(&self) -> Option<&KeyValueIndexedDb> {
        match self {
            Self::KeyValueIndexed(db) => Some(db),
            _ => None,
        }
    }
}
