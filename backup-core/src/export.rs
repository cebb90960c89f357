//! Backup creation: database envelopes, media archives and full bundles.

use crate::config::BackupSettings;
use crate::envelope::{Envelope, DATABASE_ENTRY};
use crate::fs::unique_path;
use crate::fs::walker::{walk_directory, WalkOptions};
use crate::groups::RecordGroup;
use crate::kind::BackupKind;
use crate::media::{archive_media, entry_options};
use crate::progress::ProgressReporter;
use crate::store::RecordStore;
use crate::utils::errors::Result;
use crate::utils::format::{file_timestamp, format_bytes};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub kind: BackupKind,
    pub file_name: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub groups: Vec<String>,
    pub rows: usize,
    pub media_files: usize,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Base name for a new artifact: the sanitised custom name, or
/// `backup_<kind>_<timestamp>`.
pub fn base_name(kind: BackupKind, custom: Option<&str>) -> String {
    let cleaned: String = custom
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();

    if cleaned.is_empty() {
        format!("backup_{}_{}", kind, file_timestamp())
    } else {
        cleaned.to_string()
    }
}

/// Deletes an artifact on drop unless it was committed.
struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn commit(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    fn discard(self) {}
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(
                    "[Export] Could not remove incomplete file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

struct DatabaseDump {
    groups: Vec<String>,
    rows: usize,
    warnings: Vec<String>,
}

/// Serialize every allowed group into an envelope at `path`.
///
/// A group that fails to serialize is left out with a warning.
fn dump_database<S: RecordStore + ?Sized>(
    store: &S,
    groups: &[RecordGroup],
    path: &Path,
    progress: &mut ProgressReporter<'_>,
    (from, to): (u8, u8),
) -> Result<DatabaseDump> {
    let total = groups.len();
    let mut collected = Vec::with_capacity(total);
    let mut rows = 0;
    let mut warnings = Vec::new();

    for (i, group) in groups.iter().enumerate() {
        progress.update(
            format!("Backing up {}...", group),
            ProgressReporter::step(from, to - from, i, total),
        );
        match store.dump_group(*group) {
            Ok(data) => {
                progress.message(format!("{} done ({} objects)", group, data.len()));
                rows += data.len();
                collected.push((*group, data));
            }
            Err(e) => {
                let msg = format!("Could not back up {}: {}", group, e);
                tracing::warn!("[Export] {}", msg);
                progress.message(format!("Warning: {}", msg));
                warnings.push(msg);
            }
        }
    }

    progress.update("Saving data to file...", to);
    let envelope = Envelope::new(collected)?;
    let mut writer = BufWriter::new(File::create(path)?);
    envelope.write_pretty(&mut writer)?;
    writer.flush()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    Ok(DatabaseDump {
        groups: envelope.metadata.groups,
        rows,
        warnings,
    })
}

pub fn export_database<S: RecordStore + ?Sized>(
    store: &S,
    settings: &BackupSettings,
    base: &str,
    progress: &mut ProgressReporter<'_>,
) -> Result<ExportReport> {
    progress.update("Starting database backup...", 10);
    fs::create_dir_all(&settings.backups_dir)?;

    let kind = BackupKind::Database;
    let guard = ArtifactGuard::new(unique_path(&settings.backups_dir, base, kind.file_suffix()));
    let dump = dump_database(store, &settings.groups, &guard.path, progress, (10, 80))?;
    let file_size = fs::metadata(&guard.path)?.len();
    let file_path = guard.commit();

    progress.update(
        format!("Database backup complete! Size: {}", format_bytes(file_size)),
        100,
    );
    tracing::info!(
        "[Export] Database backup {} written ({} groups, {} rows)",
        file_path.display(),
        dump.groups.len(),
        dump.rows
    );

    Ok(ExportReport {
        kind,
        file_name: file_name_of(&file_path),
        file_path,
        file_size,
        groups: dump.groups,
        rows: dump.rows,
        media_files: 0,
        warnings: dump.warnings,
        created_at: Utc::now(),
    })
}

pub fn export_media(
    settings: &BackupSettings,
    base: &str,
    progress: &mut ProgressReporter<'_>,
) -> Result<ExportReport> {
    progress.update("Starting media backup...", 10);
    fs::create_dir_all(&settings.backups_dir)?;

    let kind = BackupKind::Media;
    let guard = ArtifactGuard::new(unique_path(&settings.backups_dir, base, kind.file_suffix()));

    progress.update("Scanning media files...", 20);
    let walk = walk_directory(&settings.media_root, &media_walk_options(settings));
    let mut warnings = walk.warnings;
    progress.update(format!("Found {} files to back up", walk.files.len()), 30);

    let mut zip = ZipWriter::new(BufWriter::new(File::create(&guard.path)?));
    let media_files = archive_media(&mut zip, &walk.files, progress, (30, 90), &mut warnings)?;
    finish_archive(zip)?;

    let file_size = fs::metadata(&guard.path)?.len();
    let file_path = guard.commit();
    progress.update(
        format!("Media backup complete! Size: {}", format_bytes(file_size)),
        100,
    );
    tracing::info!(
        "[Export] Media backup {} written ({} files, {} warnings)",
        file_path.display(),
        media_files,
        warnings.len()
    );

    Ok(ExportReport {
        kind,
        file_name: file_name_of(&file_path),
        file_path,
        file_size,
        groups: Vec::new(),
        rows: 0,
        media_files,
        warnings,
        created_at: Utc::now(),
    })
}

pub fn export_full<S: RecordStore + ?Sized>(
    store: &S,
    settings: &BackupSettings,
    base: &str,
    progress: &mut ProgressReporter<'_>,
) -> Result<ExportReport> {
    progress.update("Starting full backup...", 5);
    fs::create_dir_all(&settings.backups_dir)?;

    let kind = BackupKind::Full;
    let guard = ArtifactGuard::new(unique_path(&settings.backups_dir, base, kind.file_suffix()));
    let temp = ArtifactGuard::new(unique_path(
        &settings.backups_dir,
        &format!("{}_db", base),
        BackupKind::Database.file_suffix(),
    ));

    progress.update("Backing up database...", 10);
    let dump = dump_database(store, &settings.groups, &temp.path, progress, (10, 45))?;
    let mut warnings = dump.warnings;
    progress.update("Database done, packing archive...", 50);

    let mut zip = ZipWriter::new(BufWriter::new(File::create(&guard.path)?));

    progress.update("Adding database backup to archive...", 60);
    let mut envelope = File::open(&temp.path)?;
    zip.start_file(DATABASE_ENTRY, entry_options(envelope.metadata()?.len()))?;
    io::copy(&mut envelope, &mut zip)?;
    drop(envelope);

    progress.update("Adding media files to archive...", 70);
    let walk = walk_directory(&settings.media_root, &media_walk_options(settings));
    warnings.extend(walk.warnings);
    let media_files = archive_media(&mut zip, &walk.files, progress, (70, 95), &mut warnings)?;
    finish_archive(zip)?;
    temp.discard();

    let file_size = fs::metadata(&guard.path)?.len();
    let file_path = guard.commit();
    progress.update(
        format!("Full backup complete! Size: {}", format_bytes(file_size)),
        100,
    );
    tracing::info!(
        "[Export] Full backup {} written ({} rows, {} media files)",
        file_path.display(),
        dump.rows,
        media_files
    );

    Ok(ExportReport {
        kind,
        file_name: file_name_of(&file_path),
        file_path,
        file_size,
        groups: dump.groups,
        rows: dump.rows,
        media_files,
        warnings,
        created_at: Utc::now(),
    })
}

fn media_walk_options(settings: &BackupSettings) -> WalkOptions {
    WalkOptions {
        exclude_dirs: settings.media_excludes(),
        ..WalkOptions::default()
    }
}

fn finish_archive(zip: ZipWriter<BufWriter<File>>) -> Result<()> {
    let writer = zip.finish()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;
    use crate::envelope::parse_envelope;
    use crate::testing::MemoryStore;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn settings(temp: &TempDir) -> BackupSettings {
        let media = temp.path().join("media");
        fs::create_dir_all(media.join("docs")).unwrap();
        fs::write(media.join("docs/inn.pdf"), b"pdf-bytes").unwrap();
        fs::write(media.join("logo.png"), b"png-bytes").unwrap();
        BackupSettings::new(temp.path().join("backups"), media)
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(BackupKind::Full, Some(" nightly ")), "nightly");
        assert_eq!(base_name(BackupKind::Full, Some("../../etc/x")), "_.._etc_x");
        assert!(base_name(BackupKind::Media, None).starts_with("backup_media_"));
        assert!(base_name(BackupKind::Database, Some("   ")).starts_with("backup_database_"));
    }

    #[test]
    fn test_database_export_skips_failing_group() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp).with_groups(vec![RecordGroup::Role, RecordGroup::Vacancy]);
        let store = MemoryStore::seeded().failing(RecordGroup::Vacancy);

        let report =
            export_database(&store, &settings, "db", &mut ProgressReporter::silent()).unwrap();

        assert_eq!(report.groups, vec!["home.Role"]);
        assert_eq!(report.rows, store.count(RecordGroup::Role));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.file_name, "db.json");

        let parsed = parse_envelope(&fs::read(&report.file_path).unwrap()).unwrap();
        assert!(!parsed.data.contains_key("home.Vacancy"));
        assert_eq!(
            parsed.data["home.Role"].as_array().unwrap().len(),
            store.count(RecordGroup::Role)
        );
    }

    #[test]
    fn test_media_export_archives_tree() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);

        let report = export_media(&settings, "m", &mut ProgressReporter::silent()).unwrap();
        assert_eq!(report.media_files, 2);
        assert_eq!(report.file_name, "m_media.zip");

        let archive = ZipArchive::new(File::open(&report.file_path).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["media/docs/inn.pdf", "media/logo.png"]);
    }

    #[test]
    fn test_media_export_excludes_nested_backups_dir() {
        let temp = TempDir::new().unwrap();
        let media = temp.path().join("media");
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("a.txt"), b"a").unwrap();
        let settings = BackupSettings::new(media.join("backups"), &media);

        export_media(&settings, "first", &mut ProgressReporter::silent()).unwrap();
        let second = export_media(&settings, "second", &mut ProgressReporter::silent()).unwrap();
        assert_eq!(second.media_files, 1);
    }

    #[test]
    fn test_full_export_bundles_database_and_media() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let store = MemoryStore::seeded();

        let report = export_full(&store, &settings, "nightly", &mut ProgressReporter::silent()).unwrap();
        assert_eq!(report.file_name, "nightly_full.zip");
        assert_eq!(report.media_files, 2);
        assert_eq!(report.rows, store.total_rows());

        let bytes = fs::read(&report.file_path).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let db_entries = archive.file_names().filter(|n| *n == DATABASE_ENTRY).count();
        assert_eq!(db_entries, 1);

        let mut envelope = Vec::new();
        archive
            .by_name(DATABASE_ENTRY)
            .unwrap()
            .read_to_end(&mut envelope)
            .unwrap();
        assert!(parse_envelope(&envelope).is_ok());

        let leftovers: Vec<String> = fs::read_dir(&settings.backups_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["nightly_full.zip"], "temporary envelope removed");
    }

    #[test]
    fn test_failed_export_leaves_no_artifact() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        // A file where the backups directory should be makes every write fail.
        fs::write(&settings.backups_dir, b"not a dir").unwrap();

        let store = MemoryStore::seeded();
        assert!(export_full(&store, &settings, "x", &mut ProgressReporter::silent()).is_err());
        assert!(export_database(&store, &settings, "x", &mut ProgressReporter::silent()).is_err());
        assert!(settings.backups_dir.is_file());
    }

    #[test]
    fn test_progress_is_monotonic_through_full_export() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let store = MemoryStore::seeded();

        let seen = std::cell::RefCell::new(Vec::new());
        let sink = |_: &str, pct: u8| seen.borrow_mut().push(pct);
        let mut progress = ProgressReporter::new(Some(&sink as &dyn ProgressSink));
        export_full(&store, &settings, "p", &mut progress).unwrap();

        let percents = seen.borrow();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));
    }

    #[test]
    fn test_existing_artifact_is_not_overwritten() {
        let temp = TempDir::new().unwrap();
        let settings = settings(&temp);
        let store = MemoryStore::seeded();

        let first = export_database(&store, &settings, "same", &mut ProgressReporter::silent()).unwrap();
        let second = export_database(&store, &settings, "same", &mut ProgressReporter::silent()).unwrap();
        assert_ne!(first.file_path, second.file_path);
        assert_eq!(second.file_name, "same_1.json");
    }
}
