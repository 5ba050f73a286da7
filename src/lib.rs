pub mod types;
pub mod events;
pub mod event_log;
pub mod interfaces;
pub mod store;
pub mod channels;
pub mod core;
pub mod invariants;
pub mod history;
pub mod utils;
pub mod error;
pub mod config;
pub mod observability;

pub use crate::core::{ActivationOptions, AlertCoordinator, AlertView};
pub use crate::error::{Error, Result};
pub use crate::events::alert::TriggerSource;
pub use crate::events::record::{AlertRecord, AlertStatus};
pub use crate::store::AlertRecordStore;
pub use crate::types::ids::{ChannelName, RequestId};

// Event log format version
pub const LOG_FORMAT_VERSION: u32 = 1;
