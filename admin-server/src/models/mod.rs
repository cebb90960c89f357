pub mod admin_log;
pub mod backup;
pub mod user;
