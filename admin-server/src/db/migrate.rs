use crate::db::connection::DbPool;
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY,
  password TEXT NOT NULL DEFAULT '',
  last_login TEXT,
  is_superuser INTEGER NOT NULL DEFAULT 0,
  username TEXT NOT NULL UNIQUE,
  first_name TEXT NOT NULL DEFAULT '',
  last_name TEXT NOT NULL DEFAULT '',
  email TEXT UNIQUE,
  is_staff INTEGER NOT NULL DEFAULT 0,
  is_active INTEGER NOT NULL DEFAULT 1,
  date_joined TEXT NOT NULL DEFAULT (datetime('now')),
  phone TEXT NOT NULL DEFAULT '',
  user_type TEXT NOT NULL DEFAULT 'applicant' CHECK(user_type IN ('applicant','company','admin','staff'))
);

CREATE TABLE IF NOT EXISTS roles (
  id INTEGER PRIMARY KEY,
  role_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS companies (
  id INTEGER PRIMARY KEY,
  user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
  name TEXT NOT NULL,
  number TEXT NOT NULL DEFAULT '',
  industry TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  theme TEXT,
  status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending','approved','rejected')),
  verification_document TEXT,
  created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS applicants (
  id INTEGER PRIMARY KEY,
  user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
  first_name TEXT NOT NULL DEFAULT '',
  last_name TEXT NOT NULL DEFAULT '',
  birth_date TEXT,
  resume TEXT NOT NULL DEFAULT '',
  theme TEXT
);

CREATE TABLE IF NOT EXISTS employees (
  id INTEGER PRIMARY KEY,
  user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
  first_name TEXT NOT NULL DEFAULT '',
  last_name TEXT NOT NULL DEFAULT '',
  company_id INTEGER REFERENCES companies(id) ON DELETE CASCADE,
  access_level TEXT NOT NULL DEFAULT 'standard',
  theme TEXT
);

CREATE TABLE IF NOT EXISTS work_conditions (
  id INTEGER PRIMARY KEY,
  work_conditions_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS status_vacancies (
  id INTEGER PRIMARY KEY,
  status_vacancies_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS status_responses (
  id INTEGER PRIMARY KEY,
  status_response_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vacancies (
  id INTEGER PRIMARY KEY,
  company_id INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
  work_conditions_id INTEGER REFERENCES work_conditions(id) ON DELETE CASCADE,
  position TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  requirements TEXT NOT NULL DEFAULT '',
  salary_min REAL NOT NULL DEFAULT 0,
  salary_max REAL NOT NULL DEFAULT 0,
  created_date TEXT NOT NULL DEFAULT (datetime('now')),
  status_id INTEGER REFERENCES status_vacancies(id) ON DELETE CASCADE,
  views INTEGER NOT NULL DEFAULT 0,
  experience TEXT NOT NULL DEFAULT '',
  city TEXT NOT NULL DEFAULT '',
  category TEXT NOT NULL DEFAULT '',
  work_conditions_details TEXT
);

CREATE TABLE IF NOT EXISTS complaints (
  id INTEGER PRIMARY KEY,
  vacancy_id INTEGER NOT NULL REFERENCES vacancies(id) ON DELETE CASCADE,
  complainant_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  complaint_type TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  status TEXT NOT NULL DEFAULT 'pending',
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  resolved_at TEXT,
  admin_notes TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS responses (
  id INTEGER PRIMARY KEY,
  applicants_id INTEGER NOT NULL REFERENCES applicants(id) ON DELETE CASCADE,
  vacancy_id INTEGER NOT NULL REFERENCES vacancies(id) ON DELETE CASCADE,
  response_date TEXT NOT NULL DEFAULT (datetime('now')),
  status_id INTEGER NOT NULL REFERENCES status_responses(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS favorites (
  id INTEGER PRIMARY KEY,
  applicant_id INTEGER NOT NULL REFERENCES applicants(id) ON DELETE CASCADE,
  vacancy_id INTEGER NOT NULL REFERENCES vacancies(id) ON DELETE CASCADE,
  added_date TEXT NOT NULL DEFAULT (datetime('now')),
  UNIQUE(applicant_id, vacancy_id)
);

CREATE TABLE IF NOT EXISTS action_types (
  id INTEGER PRIMARY KEY,
  code TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS admin_logs (
  id INTEGER PRIMARY KEY,
  admin_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  action_id INTEGER NOT NULL REFERENCES action_types(id) ON DELETE CASCADE,
  target_company_id INTEGER REFERENCES companies(id) ON DELETE CASCADE,
  target_object_id INTEGER,
  target_content_type TEXT NOT NULL DEFAULT '',
  details TEXT NOT NULL DEFAULT '',
  ip_address TEXT,
  user_agent TEXT NOT NULL DEFAULT '',
  created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS backups (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  backup_file TEXT NOT NULL,
  backup_type TEXT NOT NULL DEFAULT 'database' CHECK(backup_type IN ('database','media','full')),
  file_size INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  created_by_id INTEGER REFERENCES users(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_vacancies_company_id ON vacancies(company_id);
CREATE INDEX IF NOT EXISTS idx_admin_logs_created_at ON admin_logs(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_backups_created_at ON backups(created_at DESC);
"#;

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");
    let conn = pool.get()?;
    apply_schema(&conn)?;
    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}

pub fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA)?;

    // Idempotent migrations for databases created before these columns existed
    if !has_column(conn, "users", "user_type")? {
        conn.execute_batch(
            "ALTER TABLE users ADD COLUMN user_type TEXT NOT NULL DEFAULT 'applicant'",
        )?;
    }
    if !has_column(conn, "companies", "verification_document")? {
        conn.execute_batch("ALTER TABLE companies ADD COLUMN verification_document TEXT")?;
    }
    if !has_column(conn, "vacancies", "work_conditions_details")? {
        conn.execute_batch("ALTER TABLE vacancies ADD COLUMN work_conditions_details TEXT")?;
    }

    Ok(())
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    Ok(table_columns(conn, table)?.iter().any(|c| c == column))
}
