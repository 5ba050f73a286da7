pub mod event_log;
pub mod location_provider;
pub mod transport;
