use async_trait::async_trait;

use crate::entry::{Entry, Payload};
use crate::error::LogResult;

/// Decides which entries a log accepts.
///
/// Consulted for every local append and for every entry (and ancestor)
/// merged from a peer.
#[async_trait]
pub trait AccessController<T: Payload>: Send + Sync {
    /// Type tag of this controller, e.g. `"static"`.
    fn ac_type(&self) -> &str;

    /// Address under which this controller's configuration is stored.
    fn address(&self) -> String;

    /// Returns `true` if `entry`'s writer may append to the log.
    async fn can_append(&self, entry: &Entry<T>) -> LogResult<bool>;

    /// Release resources held by the controller.
    async fn close(&self) -> LogResult<()> {
        Ok(())
    }

    /// Remove any state the controller persisted.
    async fn drop_state(&self) -> LogResult<()> {
        Ok(())
    }
}

/// Accepts every entry. The default for logs opened without a controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl<T: Payload> AccessController<T> for AllowAll {
    fn ac_type(&self) -> &str {
        "allow-all"
    }

    fn address(&self) -> String {
        String::new()
    }

    async fn can_append(&self, _entry: &Entry<T>) -> LogResult<bool> {
        Ok(true)
    }
}
