//! Entry point tying the store, the settings and the operations together.

use crate::config::BackupSettings;
use crate::export::{base_name, export_database, export_full, export_media, ExportReport};
use crate::kind::BackupKind;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::restore::{self, RestoreReport};
use crate::store::RecordStore;
use crate::system::{self, ConnectionTest, MediaStats, SystemInfo};
use crate::utils::errors::{BackupError, Result};
use crate::validate;
use serde::Serialize;
use std::fs;
use std::io::{Read, Seek};
use std::path::Path;

pub struct BackupManager<S> {
    store: S,
    settings: BackupSettings,
}

impl<S: RecordStore> BackupManager<S> {
    pub fn new(store: S, settings: BackupSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Produce a new artifact of `kind` in the backups directory.
    pub fn create_backup(
        &self,
        kind: BackupKind,
        custom_name: Option<&str>,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ExportReport> {
        let base = base_name(kind, custom_name);
        tracing::info!("[Export] Creating {} backup '{}'", kind, base);
        let mut progress = ProgressReporter::new(sink);

        let result = match kind {
            BackupKind::Database => export_database(&self.store, &self.settings, &base, &mut progress),
            BackupKind::Media => export_media(&self.settings, &base, &mut progress),
            BackupKind::Full => export_full(&self.store, &self.settings, &base, &mut progress),
        };
        if let Err(e) = &result {
            tracing::error!("[Export] {} backup '{}' failed: {}", kind, base, e);
            progress.message(format!("Backup failed: {}", e));
        }
        result
    }

    /// Restore from in-memory content; the file name selects the format.
    pub fn restore_backup(
        &self,
        content: &[u8],
        file_name: &str,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<RestoreReport> {
        let mut progress = ProgressReporter::new(sink);
        let result = restore::restore_backup(&self.store, &self.settings, content, file_name, &mut progress);
        match &result {
            Ok(report) => tracing::info!("[Restore] {}: {}", file_name, report.message),
            Err(e) => tracing::error!("[Restore] {} failed: {}", file_name, e),
        }
        result
    }

    /// Restore an artifact stored on disk.
    pub fn restore_file(&self, path: &Path, sink: Option<&dyn ProgressSink>) -> Result<RestoreReport> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BackupError::Config(format!("not a file path: {}", path.display())))?;
        let content = fs::read(path)?;
        self.restore_backup(&content, &file_name, sink)
    }

    pub fn validate_backup<R: Read + Seek>(&self, reader: &mut R, file_name: &str) -> bool {
        validate::validate_backup(reader, file_name)
    }

    pub fn system_info(&self) -> SystemInfo {
        system::system_info(&self.store, &self.settings)
    }

    pub fn media_stats(&self) -> MediaStats {
        system::media_stats(&self.settings)
    }

    pub fn test_connection(&self) -> ConnectionTest {
        system::test_connection(&self.store)
    }
}

/// `{"success": true, ...report}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub report: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                report: Some(report),
                error: None,
            },
            Err(e) => Self {
                success: false,
                report: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::RecordGroup;
    use crate::testing::MemoryStore;
    use std::cell::RefCell;
    use std::fs::File;
    use tempfile::TempDir;

    fn manager(temp: &TempDir, store: MemoryStore) -> BackupManager<MemoryStore> {
        let media = temp.path().join("media");
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("photo.jpg"), b"jpeg").unwrap();
        BackupManager::new(
            store,
            BackupSettings::new(temp.path().join("backups"), media),
        )
    }

    #[test]
    fn test_create_validate_restore_full() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, MemoryStore::seeded());

        let seen = RefCell::new(Vec::new());
        let sink = |msg: &str, pct: u8| seen.borrow_mut().push((msg.to_string(), pct));
        let report = manager
            .create_backup(BackupKind::Full, Some("weekly"), Some(&sink as &dyn ProgressSink))
            .unwrap();
        assert_eq!(report.file_name, "weekly_full.zip");
        assert_eq!(seen.borrow().last().map(|(_, p)| *p), Some(100));

        let mut file = File::open(&report.file_path).unwrap();
        assert!(manager.validate_backup(&mut file, &report.file_name));

        for pk in 1..=3 {
            manager.store().remove(RecordGroup::Vacancy, pk);
        }
        let restored = manager.restore_file(&report.file_path, None).unwrap();
        assert_eq!(restored.rows_restored, 8);
        assert_eq!(manager.store().count(RecordGroup::Vacancy), 3);
        assert_eq!(restored.media_files_restored, 1);
    }

    #[test]
    fn test_media_backup_needs_no_store_rows() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, MemoryStore::empty());
        let report = manager.create_backup(BackupKind::Media, None, None).unwrap();
        assert!(report.file_name.starts_with("backup_media_"));
        assert!(report.file_name.ends_with("_media.zip"));
        assert_eq!(report.media_files, 1);
    }

    #[test]
    fn test_outcome_shapes() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, MemoryStore::seeded());

        let ok: Outcome<ExportReport> = manager.create_backup(BackupKind::Database, None, None).into();
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["rows"], 8);
        assert!(json.get("error").is_none());

        let failed: Outcome<RestoreReport> = manager.restore_backup(b"", "dump.tar", None).into();
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("dump.tar"));
    }
}
