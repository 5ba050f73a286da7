pub mod summary;

pub use summary::{AlertHistory, AlertSummary};
