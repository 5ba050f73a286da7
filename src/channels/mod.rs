pub mod adapter;
pub mod emergency_services;
pub mod location_beacon;
pub mod logging;
pub mod retry;
pub mod trusted_contacts;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::config::{ChannelConfig, ChannelKind};
use crate::events::alert::AlertPayload;
use crate::events::record::ChannelOutcome;
use crate::interfaces::transport::{ChannelMessage, DeliveryTransport};
use crate::types::ids::{ChannelName, RequestId};

pub use adapter::ChannelAdapter;
pub use retry::RetryPolicy;

/// Delivery contract every channel honours.
///
/// - Idempotent per `request_id`: a repeat call must not repeat the
///   real-world side effect
/// - Finishes within `delivery_budget()`, retries included
/// - Independent: one channel's failure never affects another
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &ChannelName;
    fn delivery_budget(&self) -> Duration;
    async fn attempt_deliver(&self, request_id: RequestId, payload: &AlertPayload) -> ChannelOutcome;
}

/// Turns an alert into the concrete messages a channel sends.
pub trait MessageComposer: Send + Sync {
    fn compose(&self, channel: &ChannelName, payload: &AlertPayload) -> Vec<ChannelMessage>;
}

pub fn composer_for(kind: &ChannelKind) -> Box<dyn MessageComposer> {
    match kind {
        ChannelKind::EmergencyServices { dial_number } => {
            Box::new(emergency_services::EmergencyServicesComposer::new(dial_number))
        }
        ChannelKind::TrustedContacts { contacts } => {
            Box::new(trusted_contacts::TrustedContactsComposer::new(contacts.clone()))
        }
        ChannelKind::LocationBeacon { endpoint } => {
            Box::new(location_beacon::LocationBeaconComposer::new(endpoint))
        }
    }
}

/// Build one adapter per enabled channel, all sharing `transport`.
pub fn build_channels(
    configs: &[ChannelConfig],
    transport: Arc<dyn DeliveryTransport>,
) -> Vec<Arc<dyn NotificationChannel>> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| Arc::new(ChannelAdapter::from_config(c, transport.clone())) as Arc<dyn NotificationChannel>)
        .collect()
}
