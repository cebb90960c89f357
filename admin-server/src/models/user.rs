use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub user_type: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.is_active && (self.is_staff || self.user_type == "admin")
    }
}

pub fn find_by_username(conn: &Connection, username: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, is_staff, is_active, user_type FROM users WHERE username = ?",
            params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    is_staff: row.get(2)?,
                    is_active: row.get(3)?,
                    user_type: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}
