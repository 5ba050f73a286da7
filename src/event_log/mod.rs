pub mod file_log;
pub mod memory_log;
