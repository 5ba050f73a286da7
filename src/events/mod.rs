pub mod alert;
pub mod base;
pub mod record;
