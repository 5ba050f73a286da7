use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::interfaces::transport::{ChannelMessage, DeliveryReceipt, DeliveryTransport, TransportError};

/// Transport that only logs what it would send. Used by the demo binary.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    sent: AtomicU64,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryTransport for LoggingTransport {
    async fn send(&self, message: &ChannelMessage) -> Result<DeliveryReceipt, TransportError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            "[{}] {:?} to {}: {}",
            message.channel,
            message.kind,
            message.recipient,
            message.body
        );
        Ok(DeliveryReceipt {
            reference: format!("log-{}", n),
        })
    }
}
