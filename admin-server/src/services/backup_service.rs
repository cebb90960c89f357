//! Backup operations shared by the HTTP handlers and the CLI.
//!
//! Everything here blocks; async callers go through `spawn_blocking`.

use crate::auth::AdminUser;
use crate::db::connection::DbPool;
use crate::db::records::SqliteRecordStore;
use crate::error::AppError;
use crate::models::admin_log::{self, AuditAction, AuditEntry};
use crate::models::backup::{self, BackupRecord, NewBackup};
use backup_core::export::base_name;
use backup_core::fs::unique_path;
use backup_core::{ArtifactFormat, BackupKind, BackupManager, ExportReport, ProgressSink, RestoreReport};
use serde::Serialize;
use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

type Manager = BackupManager<SqliteRecordStore>;

#[derive(Debug, Serialize)]
pub struct CreatedBackup {
    pub backup: BackupRecord,
    pub report: ExportReport,
}

/// Export, then record the artifact. The artifact is removed again if the
/// record cannot be written.
pub fn create_backup(
    manager: &Manager,
    db: &DbPool,
    kind: BackupKind,
    custom_name: Option<&str>,
    created_by: Option<i64>,
    sink: Option<&dyn ProgressSink>,
) -> Result<CreatedBackup, AppError> {
    let report = manager.create_backup(kind, custom_name, sink)?;
    let file_path = report.file_path.to_string_lossy().to_string();
    let new = NewBackup {
        name: &report.file_name,
        backup_type: kind,
        file_path: &file_path,
        file_size: report.file_size,
        created_by,
    };

    let created = db
        .get()
        .map_err(anyhow::Error::from)
        .and_then(|conn| backup::create(&conn, &new));
    match created {
        Ok(backup) => Ok(CreatedBackup { backup, report }),
        Err(e) => {
            if let Err(rm) = fs::remove_file(&report.file_path) {
                tracing::warn!("Could not remove unrecorded artifact {}: {}", file_path, rm);
            }
            Err(e.into())
        }
    }
}

/// Validate uploaded content and store it as a new artifact.
///
/// `.zip` uploads are recorded as full backups, `.json` as database backups.
pub fn store_upload(
    manager: &Manager,
    db: &DbPool,
    original_name: &str,
    content: &[u8],
    created_by: Option<i64>,
) -> Result<BackupRecord, AppError> {
    let kind = ArtifactFormat::from_name(original_name)?.restore_kind();
    if !manager.validate_backup(&mut Cursor::new(content), original_name) {
        return Err(AppError::BadRequest("Invalid backup file".into()));
    }

    let backups_dir = &manager.settings().backups_dir;
    fs::create_dir_all(backups_dir)?;
    let base = base_name(kind, Some(upload_stem(original_name, kind)));
    let path = unique_path(backups_dir, &base, kind.file_suffix());
    fs::write(&path, content)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_path = path.to_string_lossy().to_string();
    let created = db.get().map_err(anyhow::Error::from).and_then(|conn| {
        backup::create(
            &conn,
            &NewBackup {
                name: &name,
                backup_type: kind,
                file_path: &file_path,
                file_size: content.len() as u64,
                created_by,
            },
        )
    });

    created.map_err(|e| {
        let _ = fs::remove_file(&path);
        AppError::from(e)
    })
}

/// Strip the extension and any kind suffix the generated names carry.
fn upload_stem(name: &str, kind: BackupKind) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in [kind.file_suffix(), ".zip", ".json"] {
        if lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

pub fn find_backup(db: &DbPool, id: i64) -> Result<BackupRecord, AppError> {
    let conn = db.get()?;
    backup::find_by_id(&conn, id)?.ok_or_else(|| AppError::NotFound("Backup not found".into()))
}

pub fn restore_backup(
    manager: &Manager,
    db: &DbPool,
    id: i64,
    sink: Option<&dyn ProgressSink>,
) -> Result<(BackupRecord, RestoreReport), AppError> {
    let record = find_backup(db, id)?;
    let path = Path::new(&record.file_path);
    if !path.is_file() {
        return Err(AppError::NotFound("Backup file not found".into()));
    }
    let report = manager.restore_file(path, sink)?;
    Ok((record, report))
}

/// Remove the artifact, then its record. A file that is already gone is fine.
pub fn delete_backup(db: &DbPool, id: i64) -> Result<BackupRecord, AppError> {
    let record = find_backup(db, id)?;
    match fs::remove_file(&record.file_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!("Artifact {} already missing", record.file_path);
        }
        Err(e) => return Err(e.into()),
    }
    let conn = db.get()?;
    backup::delete(&conn, id)?;
    Ok(record)
}

/// Record the outcome of an admin operation; audit failures are only logged.
pub fn audit(
    db: &DbPool,
    admin: &AdminUser,
    action: AuditAction,
    error: Option<&str>,
    details: &str,
    target: Option<i64>,
) {
    let details = match error {
        Some(e) => format!("{}: {}", details, e),
        None => details.to_string(),
    };
    let entry = AuditEntry {
        admin_id: admin.id,
        action,
        succeeded: error.is_none(),
        details: &details,
        target_object_id: target,
        ip_address: admin.ip_address.as_deref(),
        user_agent: &admin.user_agent,
    };
    let result = db
        .get()
        .map_err(anyhow::Error::from)
        .and_then(|conn| admin_log::record(&conn, &entry));
    if let Err(e) = result {
        tracing::warn!("Could not write audit entry {}: {:#}", action.code(), e);
    }
}
