//! Restoring artifacts from in-memory content.
//!
//! Per restore: `Received -> Validated -> DatabaseDone -> (full only)
//! MediaDone -> Completed`, or `Failed` from any step. A media failure that
//! put the previous media back passes through `RolledBack` first. Row- and
//! file-level problems are counted in the report, never a separate outcome.

use crate::config::BackupSettings;
use crate::envelope::{parse_envelope, SerializedRow, DATABASE_ENTRY, MEDIA_PREFIX};
use crate::groups::RecordGroup;
use crate::kind::{ArtifactFormat, BackupKind};
use crate::media::restore_media;
use crate::progress::ProgressReporter;
use crate::store::RecordStore;
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::format_bytes;
use serde::Serialize;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Received,
    Validated,
    DatabaseDone,
    MediaDone,
    RolledBack,
    Completed,
    Failed,
}

struct PhaseLog {
    phase: RestorePhase,
}

impl PhaseLog {
    fn new() -> Self {
        Self {
            phase: RestorePhase::Received,
        }
    }

    fn advance(&mut self, next: RestorePhase) {
        tracing::info!("[Restore] {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub kind: BackupKind,
    pub phase: RestorePhase,
    pub groups_processed: usize,
    pub rows_restored: usize,
    pub rows_skipped: usize,
    pub media_files_restored: usize,
    pub media_files_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_dir: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub message: String,
}

impl RestoreReport {
    fn new(kind: BackupKind) -> Self {
        Self {
            kind,
            phase: RestorePhase::Received,
            groups_processed: 0,
            rows_restored: 0,
            rows_skipped: 0,
            media_files_restored: 0,
            media_files_skipped: 0,
            rollback_dir: None,
            warnings: Vec::new(),
            message: String::new(),
        }
    }
}

/// Restore an artifact given its bytes and declared file name.
pub fn restore_backup<S: RecordStore + ?Sized>(
    store: &S,
    settings: &BackupSettings,
    content: &[u8],
    file_name: &str,
    progress: &mut ProgressReporter<'_>,
) -> Result<RestoreReport> {
    let mut phases = PhaseLog::new();
    progress.update("Starting restore...", 0);
    progress.message(format!(
        "File read: {}, size: {}",
        file_name,
        format_bytes(content.len() as u64)
    ));

    let result = ArtifactFormat::from_name(file_name).and_then(|format| {
        phases.advance(RestorePhase::Validated);
        match format {
            ArtifactFormat::Json => {
                let mut report = RestoreReport::new(BackupKind::Database);
                restore_database(store, &settings.groups, content, &mut report, progress, (10, 90))?;
                phases.advance(RestorePhase::DatabaseDone);
                report.message = format!(
                    "Database restored: {} groups, {} objects",
                    report.groups_processed, report.rows_restored
                );
                Ok(report)
            }
            ArtifactFormat::Zip => restore_full(store, settings, content, &mut phases, progress),
        }
    });

    match result {
        Ok(mut report) => {
            phases.advance(RestorePhase::Completed);
            report.phase = RestorePhase::Completed;
            progress.update("Restore completed successfully!", 100);
            Ok(report)
        }
        Err(e) => {
            if matches!(e, BackupError::MediaRestore { rolled_back: true, .. }) {
                phases.advance(RestorePhase::RolledBack);
            }
            phases.advance(RestorePhase::Failed);
            progress.message(format!("Restore failed: {}", e));
            Err(e)
        }
    }
}

/// Replay an envelope row by row into `store`.
///
/// Groups outside `allowed` or unknown to the allow-list are skipped; rows
/// that fail to persist are counted as skipped.
fn restore_database<S: RecordStore + ?Sized>(
    store: &S,
    allowed: &[RecordGroup],
    content: &[u8],
    report: &mut RestoreReport,
    progress: &mut ProgressReporter<'_>,
    (from, to): (u8, u8),
) -> Result<()> {
    progress.message("Restoring database from JSON...");
    let envelope = parse_envelope(content)?;
    let total = envelope.data.len();

    for (i, (name, rows)) in envelope.data.iter().enumerate() {
        let group = match RecordGroup::from_name(name) {
            Some(group) if allowed.contains(&group) => group,
            _ => {
                warn(report, format!("Skipping record group {} (not in the allow-list)", name));
                continue;
            }
        };
        let Some(rows) = rows.as_array() else {
            warn(report, format!("Skipping record group {}: rows are not a list", name));
            continue;
        };

        progress.update(
            format!("Restoring {} ({} objects)...", group, rows.len()),
            ProgressReporter::step(from, to - from, i, total),
        );

        for raw in rows {
            let row: SerializedRow = match serde_json::from_value(raw.clone()) {
                Ok(row) => row,
                Err(e) => {
                    report.rows_skipped += 1;
                    warn(report, format!("Could not read object in {}: {}", group, e));
                    continue;
                }
            };
            match store.persist_row(group, &row) {
                Ok(()) => report.rows_restored += 1,
                Err(e) => {
                    report.rows_skipped += 1;
                    warn(
                        report,
                        format!("Could not restore object {} in {}: {}", row.pk, group, e),
                    );
                }
            }
        }

        report.groups_processed += 1;
        progress.message(format!("{} restored ({} objects)", group, rows.len()));
    }

    progress.update(
        format!(
            "Database restored: {} groups, {} objects",
            report.groups_processed, report.rows_restored
        ),
        to,
    );
    Ok(())
}

fn restore_full<S: RecordStore + ?Sized>(
    store: &S,
    settings: &BackupSettings,
    content: &[u8],
    phases: &mut PhaseLog,
    progress: &mut ProgressReporter<'_>,
) -> Result<RestoreReport> {
    progress.message("Restoring full backup...");
    let mut archive = ZipArchive::new(Cursor::new(content))?;

    let has_database = archive.file_names().any(|n| n == DATABASE_ENTRY);
    let media_count = archive
        .file_names()
        .filter(|n| n.starts_with(MEDIA_PREFIX) && !n.ends_with('/'))
        .count();
    if !has_database {
        return Err(BackupError::MissingDatabaseEntry);
    }
    progress.message(format!("Found {} and {} media files", DATABASE_ENTRY, media_count));

    let mut envelope = Vec::new();
    archive.by_name(DATABASE_ENTRY)?.read_to_end(&mut envelope)?;

    let mut report = RestoreReport::new(BackupKind::Full);
    progress.update("Restoring database...", 30);
    restore_database(store, &settings.groups, &envelope, &mut report, progress, (30, 70))?;
    phases.advance(RestorePhase::DatabaseDone);

    progress.update("Restoring media files...", 70);
    let media = restore_media(
        &mut archive,
        &settings.media_root,
        &settings.media_excludes(),
        settings.keep_media_rollback,
        progress,
        (70, 95),
    )?;
    phases.advance(RestorePhase::MediaDone);

    report.media_files_restored = media.files_restored;
    report.media_files_skipped = media.files_skipped;
    report.rollback_dir = media.rollback_dir;
    report.warnings.extend(media.warnings);
    report.message = format!(
        "Full backup restored. {} media files restored.",
        report.media_files_restored
    );
    progress.update(
        format!("Restored {} media files", report.media_files_restored),
        95,
    );
    Ok(report)
}

fn warn(report: &mut RestoreReport, msg: String) {
    tracing::warn!("[Restore] {}", msg);
    report.warnings.push(msg);
}
