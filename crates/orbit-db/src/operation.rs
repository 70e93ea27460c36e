use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DEL")]
    Del,
    #[serde(rename = "ADD")]
    Add,
}

/// The payload every database writes into its log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpKind,
    pub key: Option<String>,
    pub value: Option<Value>,
}

impl Operation {
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Put,
            key: Some(key.into()),
            value: Some(value),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self {
            op: OpKind::Del,
            key: Some(key.into()),
            value: None,
        }
    }

    pub fn add(value: Value) -> Self {
        Self {
            op: OpKind::Add,
            key: None,
            value: Some(value),
        }
    }

    /// The key of a PUT or DEL.
    pub fn keyed(&self) -> Option<&str> {
        match self.op {
            OpKind::Put | OpKind::Del => self.key.as_deref(),
            OpKind::Add => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names() {
        let op = Operation::put("k", json!(1));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "PUT", "key": "k", "value": 1})
        );
        assert_eq!(
            serde_json::to_value(Operation::add(json!("e"))).unwrap(),
            json!({"op": "ADD", "key": null, "value": "e"})
        );
    }

    #[test]
    fn keyed_ignores_add() {
        assert_eq!(Operation::del("k").keyed(), Some("k"));
        assert_eq!(Operation::add(json!(1)).keyed(), None);
    }
}
