//! Media tree archiving and restore.
//!
//! Restores replace the media root wholesale. The existing root is first moved
//! to a timestamped sibling; if extraction fails fatally the new root is
//! discarded and the sibling moved back, so the media root is either fully
//! replaced or exactly as it was before the restore.

use crate::envelope::MEDIA_PREFIX;
use crate::fs::walker::FileInfo;
use crate::fs::{safe_relative_path, unique_path};
use crate::progress::ProgressReporter;
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::file_timestamp;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const COPY_BUFFER: usize = 64 * 1024;

/// Entry options for every archive member.
pub fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64)
}

/// Add media files under `media/`, reporting progress across `[from, to]`.
///
/// Files that cannot be read are dropped from the archive with a warning.
/// Errors writing to the archive itself are fatal.
pub fn archive_media<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    files: &[FileInfo],
    progress: &mut ProgressReporter<'_>,
    (from, to): (u8, u8),
    warnings: &mut Vec<String>,
) -> Result<usize> {
    let total = files.len();
    let mut added = 0;

    for (i, file) in files.iter().enumerate() {
        let name = format!("{}{}", MEDIA_PREFIX, file.archive_path());
        progress.update(
            format!("Adding media file {}/{}: {}", i + 1, total, file.archive_path()),
            ProgressReporter::step(from, to - from, i, total),
        );

        let mut source = match File::open(&file.path) {
            Ok(f) => f,
            Err(e) => {
                let msg = format!("Could not add {}: {}", file.path.display(), e);
                tracing::warn!("[Media] {}", msg);
                warnings.push(msg);
                continue;
            }
        };

        zip.start_file(name.as_str(), entry_options(file.size))?;
        match copy_entry(&mut source, zip) {
            Ok(_) => added += 1,
            Err(CopyError::Source(e)) => {
                zip.abort_file()?;
                let msg = format!("Could not read {}: {}", file.path.display(), e);
                tracing::warn!("[Media] {}", msg);
                warnings.push(msg);
            }
            Err(CopyError::Dest(e)) => return Err(e.into()),
        }

        if i > 0 && i % 100 == 0 {
            progress.message(format!("Processed {}/{} media files", i, total));
        }
    }

    Ok(added)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaRestoreReport {
    pub files_restored: usize,
    pub files_skipped: usize,
    /// Rollback sibling left on disk, if retained.
    pub rollback_dir: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Replace `media_root` with the `media/` entries of `archive`.
///
/// Directories listed in `preserve` (typically the artifact directory nested
/// inside the media root) survive the restore: they travel with the rollback
/// sibling and are moved back into the fresh root once extraction succeeds.
pub fn restore_media<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    media_root: &Path,
    preserve: &[PathBuf],
    keep_rollback: bool,
    progress: &mut ProgressReporter<'_>,
    (from, to): (u8, u8),
) -> Result<MediaRestoreReport> {
    let preserved = preserved_subtrees(media_root, preserve)?;

    let rollback = if media_root.exists() {
        let sibling = rollback_sibling(media_root)?;
        tracing::info!(
            "[Media] Moving current media to {} before restore",
            sibling.display()
        );
        fs::rename(media_root, &sibling)?;
        Some(sibling)
    } else {
        None
    };

    match extract_media(archive, media_root, &preserved, progress, (from, to)) {
        Ok(mut report) => {
            if let Some(sibling) = rollback {
                let carried = carry_over(&sibling, media_root, &preserved, &mut report);
                if keep_rollback || !carried {
                    report.rollback_dir = Some(sibling);
                } else if let Err(e) = fs::remove_dir_all(&sibling) {
                    let msg = format!(
                        "Could not remove previous media at {}: {}",
                        sibling.display(),
                        e
                    );
                    tracing::warn!("[Media] {}", msg);
                    report.warnings.push(msg);
                    report.rollback_dir = Some(sibling);
                }
            }
            Ok(report)
        }
        Err(e) => {
            tracing::error!("[Media] Restore failed, attempting rollback: {}", e);
            let rolled_back = roll_back(media_root, rollback.as_deref());
            Err(BackupError::MediaRestore {
                source: Box::new(e),
                rolled_back,
            })
        }
    }
}

/// Paths of `preserve` relative to `media_root`, for those inside it.
fn preserved_subtrees(media_root: &Path, preserve: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let root = media_root
        .canonicalize()
        .unwrap_or_else(|_| media_root.to_path_buf());
    let mut subtrees = Vec::new();
    for dir in preserve {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        let Ok(relative) = dir.strip_prefix(&root) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            return Err(BackupError::Config(format!(
                "refusing to restore media over {}, it is also the backups directory",
                media_root.display()
            )));
        }
        subtrees.push(relative.to_path_buf());
    }
    Ok(subtrees)
}

/// Move preserved subtrees from the rollback sibling into the restored root.
/// Returns false if any of them is still only in the sibling.
fn carry_over(
    sibling: &Path,
    media_root: &Path,
    preserved: &[PathBuf],
    report: &mut MediaRestoreReport,
) -> bool {
    let mut all_moved = true;
    for relative in preserved {
        let from = sibling.join(relative);
        if !from.exists() {
            continue;
        }
        let dest = media_root.join(relative);
        let moved = match dest.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| fs::rename(&from, &dest));
        if let Err(e) = moved {
            let msg = format!(
                "Could not move {} back into the media root: {}",
                from.display(),
                e
            );
            tracing::warn!("[Media] {}", msg);
            report.warnings.push(msg);
            all_moved = false;
        }
    }
    all_moved
}

fn extract_media<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    media_root: &Path,
    preserved: &[PathBuf],
    progress: &mut ProgressReporter<'_>,
    (from, to): (u8, u8),
) -> Result<MediaRestoreReport> {
    fs::create_dir_all(media_root)?;

    let mut report = MediaRestoreReport::default();
    let total = archive.len();

    for i in 0..total {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || !name.starts_with(MEDIA_PREFIX) {
            continue;
        }

        let relative = &name[MEDIA_PREFIX.len()..];
        if relative.is_empty() {
            continue;
        }
        let Some(relative_path) = safe_relative_path(relative) else {
            let msg = format!("Skipping media entry outside the media root: {}", name);
            tracing::warn!("[Media] {}", msg);
            report.warnings.push(msg);
            report.files_skipped += 1;
            continue;
        };
        if preserved.iter().any(|p| relative_path.starts_with(p)) {
            let msg = format!("Skipping media entry inside the backups directory: {}", name);
            tracing::warn!("[Media] {}", msg);
            report.warnings.push(msg);
            report.files_skipped += 1;
            continue;
        }

        progress.update(
            format!("Restoring media file {}", relative),
            ProgressReporter::step(from, to - from, i, total),
        );

        let dest = media_root.join(&relative_path);
        match write_entry(&mut entry, &dest) {
            Ok(()) => report.files_restored += 1,
            Err(CopyError::Dest(e)) => {
                let _ = fs::remove_file(&dest);
                let msg = format!("Could not restore media file {}: {}", name, e);
                tracing::warn!("[Media] {}", msg);
                report.warnings.push(msg);
                report.files_skipped += 1;
            }
            Err(CopyError::Source(e)) => {
                return Err(BackupError::Io(io::Error::new(
                    e.kind(),
                    format!("corrupt archive entry {}: {}", name, e),
                )));
            }
        }
    }

    Ok(report)
}

fn write_entry<R: Read>(entry: &mut R, dest: &Path) -> std::result::Result<(), CopyError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(CopyError::Dest)?;
    }
    let mut out = File::create(dest).map_err(CopyError::Dest)?;
    copy_entry(entry, &mut out)?;
    out.flush().map_err(CopyError::Dest)
}

/// Put the pre-restore state back. Returns whether that state is in place.
fn roll_back(media_root: &Path, sibling: Option<&Path>) -> bool {
    if media_root.exists() {
        if let Err(e) = fs::remove_dir_all(media_root) {
            tracing::error!(
                "[Media] Rollback failed, could not clear {}: {}",
                media_root.display(),
                e
            );
            return false;
        }
    }

    let Some(sibling) = sibling else {
        return true;
    };
    if !sibling.exists() {
        tracing::error!("[Media] Rollback failed, {} is gone", sibling.display());
        return false;
    }
    match fs::rename(sibling, media_root) {
        Ok(()) => {
            tracing::info!("[Media] Rollback successful");
            true
        }
        Err(e) => {
            tracing::error!("[Media] Rollback failed: {}", e);
            false
        }
    }
}

fn rollback_sibling(media_root: &Path) -> Result<PathBuf> {
    let parent = media_root
        .parent()
        .ok_or_else(|| BackupError::Config("media root has no parent directory".into()))?;
    let root_name = media_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    Ok(unique_path(
        parent,
        &format!("{}_backup_{}", root_name, file_timestamp()),
        "",
    ))
}

enum CopyError {
    Source(io::Error),
    Dest(io::Error),
}

/// Copy `src` into `dst`, telling read failures from write failures apart.
fn copy_entry<R: Read + ?Sized, W: Write + ?Sized>(
    src: &mut R,
    dst: &mut W,
) -> std::result::Result<u64, CopyError> {
    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut copied = 0u64;
    loop {
        let n = match src.read(&mut buffer) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Source(e)),
        };
        dst.write_all(&buffer[..n]).map_err(CopyError::Dest)?;
        copied += n as u64;
    }
}
