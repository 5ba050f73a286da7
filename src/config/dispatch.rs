use std::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Cancellable window between trigger and dispatch.
    pub countdown_ms: u64,
    /// Slack added on top of the slowest channel's budget before the fan-out
    /// stops waiting.
    pub fanout_grace_ms: u64,
}

impl DispatchConfig {
    pub fn countdown(&self) -> Duration {
        Duration::from_millis(self.countdown_ms)
    }

    pub fn fanout_grace(&self) -> Duration {
        Duration::from_millis(self.fanout_grace_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            countdown_ms: 5_000,     // 5 seconds
            fanout_grace_ms: 1_000,
        }
    }
}
