//! Utility modules shared by the backup operations.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{BackupError, Result};
