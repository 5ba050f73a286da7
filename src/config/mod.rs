use serde::{Deserialize, Serialize};

pub mod channels;
pub mod dispatch;
pub mod loader;
pub mod store;

pub use channels::{ChannelConfig, ChannelKind, RetryConfig, TrustedContact};
pub use dispatch::DispatchConfig;
pub use loader::AppConfig;
pub use store::StoreConfig;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}
