use tracing::Span;
use tracing_subscriber::EnvFilter;
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::events::alert::TriggerSource;
use crate::types::ids::{ChannelName, RequestId};

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::ConfigError(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::ConfigError(format!("logging already initialized: {}", e)))
}

pub fn trace_activation(request_id: &RequestId, trigger: TriggerSource) -> Span {
    tracing::info_span!(
        "activation",
        request_id = %request_id,
        trigger = trigger.as_str(),
    )
}

pub fn trace_channel_delivery(request_id: &RequestId, channel: &ChannelName) -> Span {
    tracing::info_span!(
        "channel_delivery",
        request_id = %request_id,
        channel = %channel,
    )
}
