use crate::events::base::LogEntry;
use crate::error::Result;
use async_trait::async_trait;

/// Durable, append-only storage for alert history.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Seal and persist `entry`, returning its sequence number. The entry must
    /// be durable when this returns.
    async fn append(&self, entry: LogEntry) -> Result<u64>;

    /// Every entry written so far, in sequence order.
    async fn read_all(&self) -> Result<Vec<LogEntry>>;
}
