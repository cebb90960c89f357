//! Settings the backup manager runs with.

use crate::groups::RecordGroup;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Directory holding produced artifacts
    pub backups_dir: PathBuf,

    /// Root of uploaded media files
    pub media_root: PathBuf,

    /// Record groups included in database exports, in export order
    pub groups: Vec<RecordGroup>,

    /// Keep the pre-restore media directory after a successful media restore
    pub keep_media_rollback: bool,
}

impl BackupSettings {
    pub fn new(backups_dir: impl Into<PathBuf>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
            media_root: media_root.into(),
            groups: RecordGroup::ALL.to_vec(),
            keep_media_rollback: false,
        }
    }

    pub fn with_groups(mut self, groups: Vec<RecordGroup>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_keep_media_rollback(mut self, keep: bool) -> Self {
        self.keep_media_rollback = keep;
        self
    }

    /// Directories excluded from media walks: the artifact directory when it
    /// sits inside the media root.
    pub fn media_excludes(&self) -> Vec<PathBuf> {
        let media = self
            .media_root
            .canonicalize()
            .unwrap_or_else(|_| self.media_root.clone());
        let backups = self
            .backups_dir
            .canonicalize()
            .unwrap_or_else(|_| self.backups_dir.clone());
        if backups.starts_with(&media) {
            vec![backups]
        } else {
            Vec::new()
        }
    }
}
