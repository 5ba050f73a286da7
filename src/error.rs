use thiserror::Error;
use crate::events::record::AlertStatus;
use crate::types::ids::{ChannelName, RequestId};

#[derive(Error, Debug)]
pub enum Error {
    // Validation Errors
    #[error("Duplicate request ID: {0}")]
    DuplicateRequestId(RequestId),

    #[error("Unknown request: {0}")]
    UnknownRequest(RequestId),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("No notification channels configured")]
    NoChannelsConfigured,

    #[error("Invalid request ID: {0}")]
    InvalidRequestId(String),

    // State Machine Errors
    #[error("Invariant violation: {0}")]
    InvariantViolation(InvariantViolation),

    // Event Log Errors
    #[error("Event serialization failed: {0}")]
    SerializationError(String),

    #[error("Event deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Invalid checksum for log entry at sequence {sequence}")]
    InvalidChecksum {
        sequence: u64,
    },

    #[error("Corrupt event log at line {line}: {details}")]
    CorruptLog {
        line: usize,
        details: String,
    },

    #[error("Unsupported log version: {version}, max supported: {max_supported}")]
    UnsupportedLogVersion {
        version: u32,
        max_supported: u32,
    },

    // System Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    // IO Errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub details: String,
}

impl InvariantViolation {
    pub fn illegal_transition(request_id: RequestId, from: AlertStatus, to: AlertStatus) -> Self {
        InvariantViolation {
            invariant: "legal_transition",
            details: format!("{}: {:?} -> {:?} is not a legal transition", request_id, from, to),
        }
    }

    pub fn frozen_record(request_id: RequestId, status: AlertStatus) -> Self {
        InvariantViolation {
            invariant: "terminal_is_final",
            details: format!("{} is already terminal ({:?}) and cannot be written", request_id, status),
        }
    }

    pub fn channel_already_final(request_id: RequestId, channel: &ChannelName) -> Self {
        InvariantViolation {
            invariant: "channel_final_once",
            details: format!("{}: channel {} already has a final result", request_id, channel),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.details)
    }
}

impl From<InvariantViolation> for Error {
    fn from(violation: InvariantViolation) -> Self {
        Error::InvariantViolation(violation)
    }
}
