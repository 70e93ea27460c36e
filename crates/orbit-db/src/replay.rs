//! Newest-first log replay shared by the keyed views.

use std::collections::HashSet;

use orbit_log::Log;
use orbit_types::Hash;
use serde_json::Value;

use crate::error::DbResult;
use crate::operation::{OpKind, Operation};

/// A live key and the entry that last wrote it.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Value,
    pub hash: Hash,
}

/// Resolve `key` by scanning from the heads. The first PUT or DEL seen for
/// it decides.
pub(crate) fn latest(log: &Log<Operation>, key: &str) -> DbResult<Option<Record>> {
    for entry in log.traverse(None, |_| false, true)? {
        let entry = entry?;
        if entry.payload.keyed() != Some(key) {
            continue;
        }
        return Ok(match entry.payload.op {
            OpKind::Put => Some(Record {
                key: key.to_string(),
                value: entry.payload.value.unwrap_or(Value::Null),
                hash: entry.hash,
            }),
            OpKind::Del | OpKind::Add => None,
        });
    }
    Ok(None)
}

/// Every live key, newest first, stopping after `amount` records.
pub(crate) fn records(log: &Log<Operation>, amount: Option<usize>) -> DbResult<Vec<Record>> {
    let mut out = Vec::new();
    if amount == Some(0) {
        return Ok(out);
    }
    let mut seen = HashSet::new();
    for entry in log.traverse(None, |_| false, true)? {
        let entry = entry?;
        let Some(key) = entry.payload.keyed() else {
            continue;
        };
        if !seen.insert(key.to_string()) {
            continue;
        }
        if entry.payload.op == OpKind::Put {
            out.push(Record {
                key: key.to_string(),
                value: entry.payload.value.clone().unwrap_or(Value::Null),
                hash: entry.hash,
            });
            if amount.is_some_and(|amount| out.len() >= amount) {
                break;
            }
        }
    }
    Ok(out)
}
