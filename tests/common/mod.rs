//! Shared fixtures for the dispatch scenario tests.
//!
//! `ScriptedTransport` stands in for the real call/SMS/push services. Each
//! recipient gets a scripted behaviour and every send is recorded, so tests
//! can count real-world side effects.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use resq_dispatch::channels::build_channels;
use resq_dispatch::config::{ChannelConfig, DispatchConfig, RetryConfig, TrustedContact};
use resq_dispatch::event_log::memory_log::MemoryEventLog;
use resq_dispatch::interfaces::event_log::EventLog;
use resq_dispatch::interfaces::transport::{
    ChannelMessage, DeliveryReceipt, DeliveryTransport, TransportError,
};
use resq_dispatch::{AlertCoordinator, AlertRecordStore};

pub const CALL: &str = "emergency-services";
pub const CONTACTS: &str = "trusted-contacts";
pub const BEACON: &str = "location-beacon";

pub const DISPATCHER: &str = "911";
pub const BEACON_ENDPOINT: &str = "https://beacon.test/sos";

#[derive(Clone, Debug)]
pub enum Behaviour {
    Succeed,
    /// Transient failure for the first `n` sends, then success.
    FailFirst(usize),
    AlwaysTransient,
    Reject,
    /// Never answers.
    Hang,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<String, Behaviour>>,
    sent: Mutex<Vec<ChannelMessage>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, recipient: &str, behaviour: Behaviour) {
        self.script.lock().unwrap().insert(recipient.to_string(), behaviour);
    }

    pub fn sent(&self) -> Vec<ChannelMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sends_to(&self, recipient: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|m| m.recipient == recipient).count()
    }

    pub fn total_sends(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryTransport for ScriptedTransport {
    async fn send(&self, message: &ChannelMessage) -> Result<DeliveryReceipt, TransportError> {
        let behaviour = {
            let mut sent = self.sent.lock().unwrap();
            let previous = sent.iter().filter(|m| m.recipient == message.recipient).count();
            sent.push(message.clone());

            let script = self.script.lock().unwrap();
            match script.get(&message.recipient).cloned().unwrap_or(Behaviour::Succeed) {
                Behaviour::FailFirst(n) if previous >= n => Behaviour::Succeed,
                other => other,
            }
        };

        match behaviour {
            Behaviour::Succeed => Ok(DeliveryReceipt {
                reference: format!("{}-ok", message.recipient),
            }),
            Behaviour::FailFirst(_) | Behaviour::AlwaysTransient => {
                Err(TransportError::Transient("network unreachable".to_string()))
            }
            Behaviour::Reject => Err(TransportError::Permanent("recipient rejected".to_string())),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

pub fn contacts() -> Vec<TrustedContact> {
    vec![
        TrustedContact { name: "Sarah".to_string(), address: "+15550100".to_string() },
        TrustedContact { name: "Mom".to_string(), address: "+15550101".to_string() },
    ]
}

pub fn call_channel() -> ChannelConfig {
    ChannelConfig::emergency_services(CALL, DISPATCHER)
}

pub fn contacts_channel() -> ChannelConfig {
    ChannelConfig::trusted_contacts(CONTACTS, contacts())
}

pub fn beacon_channel() -> ChannelConfig {
    ChannelConfig::location_beacon(BEACON, BEACON_ENDPOINT)
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        attempt_timeout_ms: 2_000,
        ..RetryConfig::default()
    }
}

pub async fn coordinator_on(
    log: Arc<dyn EventLog>,
    channels: &[ChannelConfig],
    transport: Arc<ScriptedTransport>,
) -> AlertCoordinator {
    let store = AlertRecordStore::open(log, 64).await.unwrap();
    AlertCoordinator::new(
        DispatchConfig::default(),
        Arc::new(store),
        build_channels(channels, transport),
    )
    .unwrap()
}

pub async fn coordinator(channels: &[ChannelConfig], transport: Arc<ScriptedTransport>) -> AlertCoordinator {
    coordinator_on(Arc::new(MemoryEventLog::new()), channels, transport).await
}

pub const COUNTDOWN: Duration = Duration::from_secs(5);
