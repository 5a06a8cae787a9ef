use crate::models::UserRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, params};

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
        email: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, display_name, email, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, username, password_hash, display_name, email, created_at],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn user_email(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let email: Option<Option<String>> = conn
                .query_row("SELECT email FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(email.flatten())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a compile-time constant ("id" or "username"), never user input
    let sql = format!(
        "SELECT id, username, password, display_name, email, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                display_name: row.get(3)?,
                email: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}
