//! Audit trail of administrative backup operations.

use rusqlite::{params, Connection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    BackupCreated,
    BackupUploaded,
    BackupRestored,
    BackupDownloaded,
    BackupDeleted,
}

impl AuditAction {
    pub fn code(&self) -> &'static str {
        match self {
            AuditAction::BackupCreated => "backup_created",
            AuditAction::BackupUploaded => "backup_uploaded",
            AuditAction::BackupRestored => "backup_restored",
            AuditAction::BackupDownloaded => "backup_downloaded",
            AuditAction::BackupDeleted => "backup_deleted",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AuditAction::BackupCreated => "Backup created",
            AuditAction::BackupUploaded => "Backup uploaded",
            AuditAction::BackupRestored => "Backup restored",
            AuditAction::BackupDownloaded => "Backup downloaded",
            AuditAction::BackupDeleted => "Backup deleted",
        }
    }
}

pub struct AuditEntry<'a> {
    pub admin_id: i64,
    pub action: AuditAction,
    pub succeeded: bool,
    pub details: &'a str,
    pub target_object_id: Option<i64>,
    pub ip_address: Option<&'a str>,
    pub user_agent: &'a str,
}

/// Append one entry; failures are recorded under `<code>_failed`.
pub fn record(conn: &Connection, entry: &AuditEntry<'_>) -> anyhow::Result<()> {
    let (code, name) = if entry.succeeded {
        (entry.action.code().to_string(), entry.action.label().to_string())
    } else {
        (
            format!("{}_failed", entry.action.code()),
            format!("{} (failed)", entry.action.label()),
        )
    };

    conn.execute(
        "INSERT INTO action_types (code, name) VALUES (?1, ?2) ON CONFLICT(code) DO NOTHING",
        params![code, name],
    )?;
    conn.execute(
        "INSERT INTO admin_logs (admin_id, action_id, target_object_id, target_content_type, details, ip_address, user_agent, created_at)
         VALUES (?1, (SELECT id FROM action_types WHERE code = ?2), ?3, 'backup', ?4, ?5, ?6, ?7)",
        params![
            entry.admin_id,
            code,
            entry.target_object_id,
            entry.details,
            entry.ip_address,
            entry.user_agent,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}
