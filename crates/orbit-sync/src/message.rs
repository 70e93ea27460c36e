use serde::{Deserialize, Serialize};

/// Protocol prefix for head exchange; the log id is appended.
pub const HEADS_PROTOCOL: &str = "/orbitdb/heads";
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Messages exchanged on a heads stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// The sender's current heads, as signed entry bytes.
    Heads { log_id: String, heads: Vec<Vec<u8>> },
}

impl SyncMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Heads { .. } => 1,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Heads { .. } => "Heads",
        }
    }
}

/// Protocol id for the heads stream of `log_id`.
pub fn heads_protocol(log_id: &str) -> String {
    format!("{HEADS_PROTOCOL}/{log_id}")
}
