use crate::messages::{MESSAGE_COLS, map_message_row};
use crate::models::{MessageListRow, ThreadRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::params;

impl Database {
    pub fn thread_entry(&self, message_id: i64) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, root_message_id, message_id, parent_message_id, depth, path, created_at
                 FROM message_threads WHERE message_id = ?1",
            )?;
            let row = stmt
                .query_row([message_id], |row| {
                    Ok(ThreadRow {
                        id: row.get(0)?,
                        root_message_id: row.get(1)?,
                        message_id: row.get(2)?,
                        parent_message_id: row.get(3)?,
                        depth: row.get(4)?,
                        path: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn insert_thread_entry(
        &self,
        root_message_id: i64,
        message_id: i64,
        parent_message_id: Option<i64>,
        depth: i64,
        path: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_threads
                     (root_message_id, message_id, parent_message_id, depth, path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![root_message_id, message_id, parent_message_id, depth, path, created_at],
            )?;
            Ok(())
        })
    }

    /// Most recently created live message in a context, excluding the given
    /// message. This is the auto-threading parent.
    pub fn latest_context_message(
        &self,
        context_type: &str,
        context_id: &str,
        exclude_id: i64,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT id FROM messages
                     WHERE context_type = ?1 AND context_id = ?2
                       AND id != ?3 AND deleted_at IS NULL
                     ORDER BY created_at DESC
                     LIMIT 1",
                    params![context_type, context_id, exclude_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    /// All live messages of a thread in depth-first order. The zero-padded
    /// path strings make `ORDER BY t.path` a correct traversal.
    pub fn thread_messages(&self, root_message_id: i64) -> Result<Vec<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM message_threads t
                 JOIN messages m ON m.id = t.message_id
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE t.root_message_id = ?1 AND m.deleted_at IS NULL
                 ORDER BY t.path ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([root_message_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
