use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("peer does not support protocol {0}")]
    UnsupportedProtocol(String),

    #[error("cannot reach peer {peer}: {reason}")]
    Unreachable { peer: String, reason: String },

    #[error("heads for log {actual} received on log {expected}")]
    LogIdMismatch { expected: String, actual: String },

    #[error("dial to {peer} timed out")]
    Timeout { peer: String },

    #[error("log error: {0}")]
    Log(#[from] orbit_log::LogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
