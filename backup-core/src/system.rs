//! Introspection of the backup directory, the media tree and the store.

use crate::config::BackupSettings;
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::kind::ArtifactFormat;
use crate::store::RecordStore;
use crate::utils::format::format_bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

const LARGEST_FILES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub total_backups: usize,
    pub total_size: String,
    pub free_space: String,
    pub database_size: String,
    pub backup_directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LargeFile {
    pub path: String,
    pub size: u64,
    pub size_formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaStats {
    pub exists: bool,
    pub total_files: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
    /// Lowercase extension (`""` when absent) to file count
    pub file_types: BTreeMap<String, usize>,
    pub largest_files: Vec<LargeFile>,
}

/// Summarize stored artifacts, free space and the store size.
pub fn system_info<S: RecordStore + ?Sized>(store: &S, settings: &BackupSettings) -> SystemInfo {
    let backup_directory = settings.backups_dir.display().to_string();
    let database_size = store
        .approximate_size()
        .map(format_bytes)
        .unwrap_or_else(|e| {
            tracing::warn!("[DB] Could not determine database size: {}", e);
            "Unknown".into()
        });

    let (total_backups, total_size, error) = match artifact_totals(&settings.backups_dir) {
        Ok((count, size)) => (count, size, None),
        Err(e) => {
            tracing::warn!("[System] Could not list {}: {}", backup_directory, e);
            (0, 0, Some(e.to_string()))
        }
    };

    let free_space = free_space(&settings.backups_dir)
        .map(format_bytes)
        .unwrap_or_else(|| "Unknown".into());

    SystemInfo {
        total_backups,
        total_size: format_bytes(total_size),
        free_space,
        database_size,
        backup_directory,
        error,
    }
}

/// Artifacts are the `.json` and `.zip` files directly inside the directory.
/// A directory that does not exist yet holds nothing.
fn artifact_totals(dir: &Path) -> std::io::Result<(usize, u64)> {
    if !dir.exists() {
        return Ok((0, 0));
    }
    let mut count = 0;
    let mut size = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let name = entry.file_name();
        if metadata.is_file() && ArtifactFormat::from_name(&name.to_string_lossy()).is_ok() {
            count += 1;
            size += metadata.len();
        }
    }
    Ok((count, size))
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
fn free_space(path: &Path) -> Option<u64> {
    let target = path
        .ancestors()
        .find(|p| p.exists())
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let output = Command::new("df").arg("-B1").arg(target).output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df_available(&String::from_utf8_lossy(&output.stdout))
}

fn parse_df_available(stdout: &str) -> Option<u64> {
    let line = stdout.trim().lines().nth(1)?;
    line.split_whitespace().nth(3)?.parse().ok()
}

pub fn test_connection<S: RecordStore + ?Sized>(store: &S) -> ConnectionTest {
    match store.ping() {
        Ok(()) => ConnectionTest {
            success: true,
            message: "Database connection successful".into(),
        },
        Err(e) => {
            tracing::error!("[DB] Connection test failed: {}", e);
            ConnectionTest {
                success: false,
                message: format!("Database connection failed: {}", e),
            }
        }
    }
}

/// Walk the media root. The backups directory is left out when nested.
pub fn media_stats(settings: &BackupSettings) -> MediaStats {
    let exists = settings.media_root.is_dir();
    let walk = walk_directory(
        &settings.media_root,
        &WalkOptions {
            exclude_dirs: settings.media_excludes(),
            ..WalkOptions::default()
        },
    );

    let mut file_types = BTreeMap::new();
    for file in &walk.files {
        let ext = file
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        *file_types.entry(ext).or_insert(0) += 1;
    }

    let mut by_size: Vec<_> = walk.files.iter().collect();
    by_size.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.relative_path.cmp(&b.relative_path)));
    let largest_files = by_size
        .into_iter()
        .take(LARGEST_FILES)
        .map(|f| LargeFile {
            path: f.archive_path(),
            size: f.size,
            size_formatted: format_bytes(f.size),
        })
        .collect();

    let total_size = walk.files.iter().map(|f| f.size).sum();
    MediaStats {
        exists,
        total_files: walk.files.len(),
        total_size,
        total_size_formatted: format_bytes(total_size),
        file_types,
        largest_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_parse_df_output() {
        let out = "Filesystem     1B-blocks        Used   Available Use% Mounted on\n\
                   /dev/sda1   100000000000 40000000000 60000000000  40% /\n";
        assert_eq!(parse_df_available(out), Some(60_000_000_000));
        assert_eq!(parse_df_available("Filesystem\n"), None);
    }

    #[test]
    fn test_system_info_counts_artifacts_only() {
        let temp = TempDir::new().unwrap();
        let settings = BackupSettings::new(temp.path().join("backups"), temp.path().join("media"));
        fs::create_dir_all(&settings.backups_dir).unwrap();
        fs::write(settings.backups_dir.join("a.json"), vec![0u8; 1024]).unwrap();
        fs::write(settings.backups_dir.join("b_full.zip"), vec![0u8; 1024]).unwrap();
        fs::write(settings.backups_dir.join("notes.txt"), b"x").unwrap();

        let info = system_info(&MemoryStore::seeded(), &settings);
        assert_eq!(info.total_backups, 2);
        assert_eq!(info.total_size, "2.00 KB");
        assert_eq!(info.database_size, "1.00 KB");
        assert!(info.error.is_none());
    }

    #[test]
    fn test_system_info_missing_directory() {
        let temp = TempDir::new().unwrap();
        let settings = BackupSettings::new(temp.path().join("nope"), temp.path().join("media"));
        let info = system_info(&MemoryStore::empty(), &settings);
        assert_eq!(info.total_backups, 0);
        assert_eq!(info.total_size, "0 B");
        assert!(info.error.is_none());
    }

    #[test]
    fn test_connection_reports_ping() {
        assert!(test_connection(&MemoryStore::empty()).success);
    }

    #[test]
    fn test_media_stats() {
        let temp = TempDir::new().unwrap();
        let media = temp.path().join("media");
        fs::create_dir_all(media.join("resumes")).unwrap();
        fs::write(media.join("resumes/cv.PDF"), vec![0u8; 300]).unwrap();
        fs::write(media.join("resumes/other.pdf"), vec![0u8; 100]).unwrap();
        fs::write(media.join("logo.png"), vec![0u8; 200]).unwrap();
        fs::write(media.join("README"), b"r").unwrap();
        let settings = BackupSettings::new(media.join("backups"), &media);
        fs::create_dir_all(&settings.backups_dir).unwrap();
        fs::write(settings.backups_dir.join("big.zip"), vec![0u8; 5000]).unwrap();

        let stats = media_stats(&settings);
        assert!(stats.exists);
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.total_size, 601);
        assert_eq!(stats.file_types.get("pdf"), Some(&2));
        assert_eq!(stats.file_types.get("png"), Some(&1));
        assert_eq!(stats.file_types.get(""), Some(&1));
        assert_eq!(stats.largest_files[0].path, "resumes/cv.PDF");
        assert_eq!(stats.largest_files.len(), 4);
    }

    #[test]
    fn test_media_stats_missing_root() {
        let temp = TempDir::new().unwrap();
        let settings = BackupSettings::new(temp.path().join("b"), temp.path().join("missing"));
        let stats = media_stats(&settings);
        assert!(!stats.exists);
        assert_eq!(stats.total_files, 0);
        assert!(stats.largest_files.is_empty());
    }
}
