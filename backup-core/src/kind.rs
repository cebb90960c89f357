//! Backup kinds and the artifact formats they produce.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Database,
    Media,
    Full,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Database => "database",
            BackupKind::Media => "media",
            BackupKind::Full => "full",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BackupKind::Database => "Database only",
            BackupKind::Media => "Media only",
            BackupKind::Full => "Full",
        }
    }

    pub fn format(&self) -> ArtifactFormat {
        match self {
            BackupKind::Database => ArtifactFormat::Json,
            BackupKind::Media | BackupKind::Full => ArtifactFormat::Zip,
        }
    }

    /// Suffix appended to the base name, extension included.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            BackupKind::Database => ".json",
            BackupKind::Media => "_media.zip",
            BackupKind::Full => "_full.zip",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(BackupKind::Database),
            "media" => Ok(BackupKind::Media),
            "full" => Ok(BackupKind::Full),
            other => Err(BackupError::Config(format!("unknown backup type '{}'", other))),
        }
    }
}

/// Container format of a stored or uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Zip,
}

impl ArtifactFormat {
    /// Detect the container from the declared file name.
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".json") {
            Ok(ArtifactFormat::Json)
        } else if lower.ends_with(".zip") {
            Ok(ArtifactFormat::Zip)
        } else {
            Err(BackupError::UnsupportedFormat(name.to_string()))
        }
    }

    /// Kind a restore of this container applies.
    pub fn restore_kind(&self) -> BackupKind {
        match self {
            ArtifactFormat::Json => BackupKind::Database,
            ArtifactFormat::Zip => BackupKind::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("database".parse::<BackupKind>().unwrap(), BackupKind::Database);
        assert_eq!("FULL".parse::<BackupKind>().unwrap(), BackupKind::Full);
        assert!("tape".parse::<BackupKind>().is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArtifactFormat::from_name("a.json").unwrap(), ArtifactFormat::Json);
        assert_eq!(ArtifactFormat::from_name("a_full.ZIP").unwrap(), ArtifactFormat::Zip);
        assert!(matches!(
            ArtifactFormat::from_name("dump.sql"),
            Err(BackupError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_restore_kind_follows_container() {
        assert_eq!(ArtifactFormat::Json.restore_kind(), BackupKind::Database);
        assert_eq!(ArtifactFormat::Zip.restore_kind(), BackupKind::Full);
    }
}
