//! Error types for backup, restore and validation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unsupported backup format: {0}. Use .zip or .json")]
    UnsupportedFormat(String),

    #[error("Invalid backup format: {0}")]
    InvalidEnvelope(String),

    #[error("Database backup not found in full backup")]
    MissingDatabaseEntry,

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Media restore failed ({}): {source}", rollback_note(.rolled_back))]
    MediaRestore {
        #[source]
        source: Box<BackupError>,
        rolled_back: bool,
    },
}

impl BackupError {
    /// Wrap any displayable storage-layer failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        BackupError::Store(err.to_string())
    }
}

fn rollback_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        "previous media restored"
    } else {
        "rollback not performed"
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
