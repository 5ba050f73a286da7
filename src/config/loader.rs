use std::collections::HashSet;
use crate::config::{ChannelConfig, DispatchConfig, LoggingConfig, StoreConfig};
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("RESQ").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        let enabled: Vec<&ChannelConfig> = self.channels.iter().filter(|c| c.enabled).collect();
        if enabled.is_empty() {
            return Err(Error::NoChannelsConfigured);
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name.as_str()) {
                return Err(Error::ConfigError(format!("duplicate channel name: {}", channel.name)));
            }
            if channel.retry.max_attempts == 0 {
                return Err(Error::ConfigError(format!("{}: max_attempts must be at least 1", channel.name)));
            }
            if channel.retry.attempt_timeout_ms == 0 {
                return Err(Error::ConfigError(format!("{}: attempt_timeout_ms must be positive", channel.name)));
            }
            if channel.retry.backoff_multiplier < 1.0 {
                return Err(Error::ConfigError(format!("{}: backoff_multiplier must be >= 1.0", channel.name)));
            }
        }

        Ok(())
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|c| c.enabled)
    }
}
