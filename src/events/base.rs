use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::error::{Error, Result};
use crate::events::alert::AlertRequest;
use crate::events::record::{AlertStatus, ChannelOutcome};
use crate::types::ids::{ChannelName, RequestId};
use crate::types::timestamp::Timestamp;

/// One line of the append-only alert log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub version: u32,
    pub sequence: u64,       // Set by the event log
    pub timestamp: Timestamp,
    pub request_id: RequestId,
    pub change: RecordChange,
    pub checksum: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RecordChange {
    Created {
        request: AlertRequest,
        channels: Vec<ChannelName>,
    },
    StatusChanged {
        from: AlertStatus,
        to: AlertStatus,
    },
    ChannelCompleted(ChannelOutcome),
    Finalized {
        status: AlertStatus,
    },
}

impl RecordChange {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordChange::Created { .. } => "created",
            RecordChange::StatusChanged { .. } => "status_changed",
            RecordChange::ChannelCompleted(_) => "channel_completed",
            RecordChange::Finalized { .. } => "finalized",
        }
    }
}

impl LogEntry {
    pub fn new(request_id: RequestId, change: RecordChange) -> Self {
        LogEntry {
            version: crate::LOG_FORMAT_VERSION,
            sequence: 0,
            timestamp: Timestamp::now(),
            request_id,
            change,
            checksum: String::new(),
        }
    }

    /// Assign the log position and seal the entry.
    pub fn seal(&mut self, sequence: u64) -> Result<()> {
        self.sequence = sequence;
        self.checksum = self.calculate_checksum()?;
        Ok(())
    }

    pub fn calculate_checksum(&self) -> Result<String> {
        let change = serde_json::to_vec(&self.change)
            .map_err(|e| Error::SerializationError(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.timestamp.physical.to_le_bytes());
        hasher.update(self.timestamp.logical.to_le_bytes());
        hasher.update(self.request_id.to_string().as_bytes());
        hasher.update(&change);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn verify_checksum(&self) -> bool {
        matches!(self.calculate_checksum(), Ok(sum) if sum == self.checksum)
    }
}
