use backup_core::utils::format::format_bytes;
use backup_core::BackupKind;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub id: i64,
    pub name: String,
    pub backup_type: BackupKind,
    pub file_path: String,
    pub file_size: i64,
    pub created_at: String,
    pub created_by: Option<i64>,
    pub file_size_display: String,
    pub backup_type_display: String,
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupRecord> {
    let kind: String = row.get("backup_type")?;
    let backup_type: BackupKind = kind
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let file_size: i64 = row.get("file_size")?;
    Ok(BackupRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        file_path: row.get("backup_file")?,
        file_size,
        created_at: row.get("created_at")?,
        created_by: row.get("created_by_id")?,
        file_size_display: format_bytes(file_size.max(0) as u64),
        backup_type_display: backup_type.display_name().to_string(),
        backup_type,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups ORDER BY created_at DESC, id DESC")?;
    let rows = stmt.query_map([], row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        match row {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("[DB] Skipping unreadable backup record: {}", e),
        }
    }
    Ok(records)
}

pub fn find_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], row_to_record)?;
    Ok(rows.next().transpose()?)
}

pub struct NewBackup<'a> {
    pub name: &'a str,
    pub backup_type: BackupKind,
    pub file_path: &'a str,
    pub file_size: u64,
    pub created_by: Option<i64>,
}

pub fn create(conn: &Connection, data: &NewBackup<'_>) -> anyhow::Result<BackupRecord> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO backups (name, backup_file, backup_type, file_size, created_at, created_by_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            data.name,
            data.file_path,
            data.backup_type.as_str(),
            data.file_size as i64,
            now,
            data.created_by
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("Failed to retrieve created backup"))
}

pub fn delete(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let changed = conn.execute("DELETE FROM backups WHERE id = ?", params![id])?;
    Ok(changed > 0)
}
