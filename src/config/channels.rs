use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub kind: ChannelKind,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelKind {
    EmergencyServices { dial_number: String },
    TrustedContacts { contacts: Vec<TrustedContact> },
    LocationBeacon { endpoint: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrustedContact {
    pub name: String,
    /// Phone number or push address.
    pub address: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempt_timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            attempt_timeout_ms: 10_000,  // 10 seconds
            max_attempts: 3,
            initial_backoff_ms: 1_000,   // 1 second, doubling
            backoff_multiplier: 2.0,
        }
    }
}

impl ChannelConfig {
    pub fn emergency_services(name: &str, dial_number: &str) -> Self {
        ChannelConfig {
            name: name.to_string(),
            enabled: true,
            kind: ChannelKind::EmergencyServices {
                dial_number: dial_number.to_string(),
            },
            retry: RetryConfig::default(),
        }
    }

    pub fn trusted_contacts(name: &str, contacts: Vec<TrustedContact>) -> Self {
        ChannelConfig {
            name: name.to_string(),
            enabled: true,
            kind: ChannelKind::TrustedContacts { contacts },
            retry: RetryConfig::default(),
        }
    }

    pub fn location_beacon(name: &str, endpoint: &str) -> Self {
        ChannelConfig {
            name: name.to_string(),
            enabled: true,
            kind: ChannelKind::LocationBeacon {
                endpoint: endpoint.to_string(),
            },
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
