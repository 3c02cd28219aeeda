pub mod analytics;
pub mod backup_exchange;
pub mod core;
pub mod databases;
pub mod import;
pub mod portal;
pub mod students;
