use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, params};
use tracing::info;

impl Database {
    // -- Projects & tasks --

    pub fn insert_project(&self, id: &str, title: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, title, created_at) VALUES (?1, ?2, ?3)",
                params![id, title, created_at],
            )?;
            Ok(())
        })
    }

    pub fn insert_task(&self, id: &str, project_id: &str, title: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO project_tasks (id, project_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, project_id, title, created_at],
            )?;
            Ok(())
        })
    }

    pub fn project_title(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let title = conn
                .query_row("SELECT title FROM projects WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(title)
        })
    }

    pub fn task_title(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let title = conn
                .query_row("SELECT title FROM project_tasks WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(title)
        })
    }

    // -- Assignments --

    pub fn is_assigned_to_project(&self, project_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM project_assignments
                 WHERE project_id = ?1 AND user_id = ?2)",
                params![project_id, user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn is_assigned_to_task(&self, task_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM task_assignments
                 WHERE task_id = ?1 AND user_id = ?2)",
                params![task_id, user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn replace_project_assignments(&self, project_id: &str, user_ids: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM project_assignments WHERE project_id = ?1", [project_id])?;
            let mut stmt = conn
                .prepare("INSERT INTO project_assignments (project_id, user_id) VALUES (?1, ?2)")?;
            for user_id in user_ids {
                stmt.execute(params![project_id, user_id])?;
            }
            Ok(())
        })
    }

    pub fn replace_task_assignments(&self, task_id: &str, user_ids: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM task_assignments WHERE task_id = ?1", [task_id])?;
            let mut stmt =
                conn.prepare("INSERT INTO task_assignments (task_id, user_id) VALUES (?1, ?2)")?;
            for user_id in user_ids {
                stmt.execute(params![task_id, user_id])?;
            }
            Ok(())
        })
    }

    // -- Revocation --

    /// Flip `context_access_revoked` for recipient rows of this context whose
    /// recipient is no longer allowed. Rows are never deleted; history stays.
    /// Returns the number of rows revoked.
    pub fn revoke_context_recipients(
        &self,
        context_type: &str,
        context_id: &str,
        allowed_user_ids: &[String],
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let revoked = if allowed_user_ids.is_empty() {
                conn.execute(
                    "UPDATE message_recipients SET context_access_revoked = 1
                     WHERE context_access_revoked = 0
                       AND message_id IN
                           (SELECT id FROM messages WHERE context_type = ?1 AND context_id = ?2)",
                    params![context_type, context_id],
                )?
            } else {
                revoke_with_allow_list(conn, context_type, context_id, allowed_user_ids)?
            };
            if revoked > 0 {
                info!(
                    "Revoked {} recipient rows for context {}/{}",
                    revoked, context_type, context_id
                );
            }
            Ok(revoked)
        })
    }
}

fn revoke_with_allow_list(
    conn: &Connection,
    context_type: &str,
    context_id: &str,
    allowed_user_ids: &[String],
) -> Result<usize> {
    // Dynamic placeholder list for the NOT IN clause; ?1/?2 hold the context
    let placeholders: Vec<String> =
        (3..3 + allowed_user_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "UPDATE message_recipients SET context_access_revoked = 1
         WHERE context_access_revoked = 0
           AND recipient_id NOT IN ({})
           AND message_id IN
               (SELECT id FROM messages WHERE context_type = ?1 AND context_id = ?2)",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&context_type, &context_id];
    params.extend(allowed_user_ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));

    Ok(stmt.execute(params.as_slice())?)
}
