use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::types::ids::{ChannelName, RequestId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    VoiceCall,
    Text,
    Beacon,
}

/// A single real-world side effect a transport is asked to perform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub request_id: RequestId,
    pub channel: ChannelName,
    pub kind: MessageKind,
    pub recipient: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub reference: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transient transport failure: {0}")]
    Transient(String),

    #[error("Permanent transport failure: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// The external call/SMS/push mechanism behind a channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, message: &ChannelMessage) -> Result<DeliveryReceipt, TransportError>;
}
