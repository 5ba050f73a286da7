pub mod ids;
pub mod location;
pub mod timestamp;
