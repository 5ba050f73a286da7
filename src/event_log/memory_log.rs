use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::error::Result;
use crate::events::base::LogEntry;
use crate::interfaces::event_log::EventLog;

/// Non-durable log for tests and demo runs.
#[derive(Default)]
pub struct MemoryEventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, mut entry: LogEntry) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let sequence = entries.len() as u64 + 1;
        entry.seal(sequence)?;
        entries.push(entry);
        Ok(sequence)
    }

    async fn read_all(&self) -> Result<Vec<LogEntry>> {
        Ok(self.entries.lock().await.clone())
    }
}
