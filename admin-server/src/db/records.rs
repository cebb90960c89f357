//! SQLite-backed record store for the job-board tables.

use crate::db::connection::DbPool;
use crate::db::migrate::table_columns;
use backup_core::{BackupError, RecordGroup, RecordStore, SerializedRow};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map, Number, Value};

const PK_COLUMN: &str = "id";

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: DbPool,
}

impl SqliteRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> backup_core::Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get().map_err(BackupError::store)
    }
}

impl RecordStore for SqliteRecordStore {
    fn dump_group(&self, group: RecordGroup) -> backup_core::Result<Vec<SerializedRow>> {
        let conn = self.conn()?;
        dump_table(&conn, group).map_err(BackupError::store)
    }

    fn persist_row(&self, group: RecordGroup, row: &SerializedRow) -> backup_core::Result<()> {
        let pk = row
            .pk
            .as_i64()
            .ok_or_else(|| BackupError::Store(format!("non-integer primary key {}", row.pk)))?;
        let conn = self.conn()?;
        upsert_row(&conn, group, pk, &row.fields).map_err(BackupError::store)
    }

    fn approximate_size(&self) -> backup_core::Result<u64> {
        let conn = self.conn()?;
        let pages: i64 = conn
            .query_row("PRAGMA page_count", [], |r| r.get(0))
            .map_err(BackupError::store)?;
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |r| r.get(0))
            .map_err(BackupError::store)?;
        Ok((pages.max(0) as u64) * (page_size.max(0) as u64))
    }

    fn ping(&self) -> backup_core::Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
            .map_err(BackupError::store)?;
        Ok(())
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn dump_table(conn: &Connection, group: RecordGroup) -> rusqlite::Result<Vec<SerializedRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} ORDER BY {}",
        quote(group.table()),
        quote(PK_COLUMN)
    ))?;
    let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut pk = Value::Null;
        let mut fields = Map::new();
        for (i, name) in names.iter().enumerate() {
            let value = to_json(row.get_ref(i)?);
            if name == PK_COLUMN {
                pk = value;
            } else {
                fields.insert(name.clone(), value);
            }
        }
        out.push(SerializedRow::new(group, pk, fields));
    }
    Ok(out)
}

/// Insert or update by primary key. An update never deletes the existing row,
/// so rows referencing it through `ON DELETE CASCADE` survive a restore.
/// Fields naming columns the table does not have are ignored.
fn upsert_row(
    conn: &Connection,
    group: RecordGroup,
    pk: i64,
    fields: &Map<String, Value>,
) -> rusqlite::Result<()> {
    let columns = table_columns(conn, group.table())?;

    let mut names = vec![PK_COLUMN.to_string()];
    let mut values = vec![SqlValue::Integer(pk)];
    for (name, value) in fields {
        if name == PK_COLUMN {
            continue;
        }
        if !columns.iter().any(|c| c == name) {
            tracing::debug!("[DB] Ignoring unknown column {}.{}", group.table(), name);
            continue;
        }
        names.push(name.clone());
        values.push(to_sql(value));
    }

    let quoted: Vec<String> = names.iter().map(|n| quote(n)).collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let conflict = if quoted.len() > 1 {
        let updates: Vec<String> = quoted[1..]
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!("DO UPDATE SET {}", updates.join(", "))
    } else {
        "DO NOTHING".to_string()
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote(group.table()),
        quoted.join(", "),
        placeholders.join(", "),
        quote(PK_COLUMN),
        conflict
    );
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|&byte| Value::from(byte)).collect()),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::memory_pool;
    use backup_core::{BackupKind, BackupManager, BackupSettings};
    use serde_json::json;
    use tempfile::TempDir;

    fn seed(pool: &DbPool) {
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, username, email, user_type) VALUES (1, 'admin', 'a@x', 'admin');
             INSERT INTO users (id, username, email, user_type) VALUES (2, 'hr', 'hr@x', 'company');
             INSERT INTO companies (id, user_id, name, status) VALUES (1, 2, 'Acme', 'approved');
             INSERT INTO work_conditions (id, work_conditions_name) VALUES (1, 'Remote');
             INSERT INTO status_vacancies (id, status_vacancies_name) VALUES (1, 'Open');
             INSERT INTO vacancies (id, company_id, work_conditions_id, position, salary_min, salary_max, status_id)
               VALUES (1, 1, 1, 'Rust engineer', 1000.5, 2000, 1);
             INSERT INTO vacancies (id, company_id, work_conditions_id, position, status_id)
               VALUES (2, 1, 1, 'QA', 1);",
        )
        .unwrap();
    }

    fn count(pool: &DbPool, table: &str) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_dump_serializes_columns_and_foreign_keys() {
        let pool = memory_pool();
        seed(&pool);
        let store = SqliteRecordStore::new(pool);

        let rows = store.dump_group(RecordGroup::Vacancy).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model, "home.vacancy");
        assert_eq!(rows[0].pk, json!(1));
        assert_eq!(rows[0].fields["company_id"], json!(1));
        assert_eq!(rows[0].fields["salary_min"], json!(1000.5));
        assert!(!rows[0].fields.contains_key("id"));
    }

    #[test]
    fn test_database_round_trip_through_manager() {
        let temp = TempDir::new().unwrap();
        let pool = memory_pool();
        seed(&pool);
        let manager = BackupManager::new(
            SqliteRecordStore::new(pool.clone()),
            BackupSettings::new(temp.path().join("backups"), temp.path().join("media")),
        );

        let export = manager.create_backup(BackupKind::Database, None, None).unwrap();
        assert_eq!(export.rows, 7);

        pool.get()
            .unwrap()
            .execute_batch("DELETE FROM vacancies; DELETE FROM companies;")
            .unwrap();
        let report = manager.restore_file(&export.file_path, None).unwrap();

        assert_eq!(report.rows_restored, 7);
        assert_eq!(report.rows_skipped, 0);
        assert_eq!(count(&pool, "vacancies"), 2);
        assert_eq!(count(&pool, "companies"), 1);
    }

    #[test]
    fn test_orphan_row_is_rejected_by_foreign_key() {
        let pool = memory_pool();
        seed(&pool);
        let store = SqliteRecordStore::new(pool.clone());

        let orphan = SerializedRow::new(
            RecordGroup::Vacancy,
            9,
            json!({"company_id": 42, "position": "Ghost"}).as_object().cloned().unwrap(),
        );
        assert!(store.persist_row(RecordGroup::Vacancy, &orphan).is_err());
        assert_eq!(count(&pool, "vacancies"), 2);
    }

    #[test]
    fn test_upsert_keeps_dependent_rows() {
        let pool = memory_pool();
        seed(&pool);
        let store = SqliteRecordStore::new(pool.clone());

        let company = SerializedRow::new(
            RecordGroup::Company,
            1,
            json!({"user_id": 2, "name": "Acme Renamed", "legacy_column": true})
                .as_object()
                .cloned()
                .unwrap(),
        );
        store.persist_row(RecordGroup::Company, &company).unwrap();

        let name: String = pool
            .get()
            .unwrap()
            .query_row("SELECT name FROM companies WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Acme Renamed");
        assert_eq!(count(&pool, "vacancies"), 2);
    }

    #[test]
    fn test_non_integer_pk_rejected() {
        let store = SqliteRecordStore::new(memory_pool());
        let row = SerializedRow::new(RecordGroup::Role, "abc", Map::new());
        assert!(store.persist_row(RecordGroup::Role, &row).is_err());
    }

    #[test]
    fn test_size_and_ping() {
        let store = SqliteRecordStore::new(memory_pool());
        assert!(store.approximate_size().unwrap() > 0);
        assert!(store.ping().is_ok());
    }
}
