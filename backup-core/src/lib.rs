//! Backup and restore of the job board's records and media.
//!
//! Artifacts come in three kinds: a JSON envelope of the database, a zip of
//! the media tree, or a zip bundling both. Everything here is synchronous;
//! callers on an async runtime run operations on a blocking thread.

pub mod config;
pub mod envelope;
pub mod export;
pub mod fs;
pub mod groups;
pub mod kind;
pub mod manager;
pub mod media;
pub mod progress;
pub mod restore;
pub mod store;
pub mod system;
pub mod utils;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::BackupSettings;
pub use envelope::SerializedRow;
pub use export::ExportReport;
pub use groups::RecordGroup;
pub use kind::{ArtifactFormat, BackupKind};
pub use manager::{BackupManager, Outcome};
pub use progress::{ProgressSink, ProgressSnapshot};
pub use restore::{RestorePhase, RestoreReport};
pub use store::RecordStore;
pub use system::{ConnectionTest, MediaStats, SystemInfo};
pub use utils::errors::{BackupError, Result};
