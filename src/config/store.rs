use std::path::PathBuf;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Alert log location. `None` keeps history in memory only.
    pub log_path: Option<PathBuf>,
    /// Capacity of the update broadcast for UI subscribers.
    pub update_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            log_path: None,
            update_buffer: 256,
        }
    }
}
