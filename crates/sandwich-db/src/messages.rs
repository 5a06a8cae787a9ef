use crate::models::{MessageListRow, MessageRow, PendingEmailRow, RecipientRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

/// Shared SELECT head for message queries that resolve the sender's name.
pub(crate) const MESSAGE_COLS: &str = "m.id, m.sender_id, \
     COALESCE(u.display_name, u.username, m.sender_id) AS sender_name, \
     m.content, m.context_type, m.context_id, m.created_at, m.edited_at, m.edited_content";

pub(crate) fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageListRow> {
    Ok(MessageListRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_name: row.get(2)?,
        content: row.get(3)?,
        context_type: row.get(4)?,
        context_id: row.get(5)?,
        created_at: row.get(6)?,
        edited_at: row.get(7)?,
        edited_content: row.get(8)?,
        read: None,
        read_at: None,
    })
}

fn map_inbox_row(row: &Row<'_>) -> rusqlite::Result<MessageListRow> {
    let mut msg = map_message_row(row)?;
    msg.read = Some(row.get(9)?);
    msg.read_at = row.get(10)?;
    Ok(msg)
}

impl Database {
    // -- Messages --

    pub fn insert_message(
        &self,
        sender_id: &str,
        content: &str,
        context_type: Option<&str>,
        context_id: Option<&str>,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, content, context_type, context_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sender_id, content, context_type, context_id, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn insert_recipients(
        &self,
        message_id: i64,
        recipient_ids: &[String],
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO message_recipients (message_id, recipient_id, created_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for recipient_id in recipient_ids {
                stmt.execute(params![message_id, recipient_id, created_at])?;
            }
            Ok(())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// A single message with its sender name resolved.
    pub fn message_view(&self, id: i64) -> Result<Option<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.id = ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    pub fn set_message_edited(&self, id: i64, edited_content: &str, edited_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET edited_content = ?2, edited_at = ?3 WHERE id = ?1",
                params![id, edited_content, edited_at],
            )?;
            Ok(())
        })
    }

    /// Soft delete: the row is kept so thread and kudos references stay valid.
    pub fn soft_delete_message(
        &self,
        id: i64,
        deleted_by: &str,
        deleted_at: &str,
        marker: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET deleted_at = ?2, deleted_by = ?3, content = ?4 WHERE id = ?1",
                params![id, deleted_at, deleted_by, marker],
            )?;
            Ok(())
        })
    }

    // -- Recipient read state --

    pub fn recipient_row(&self, message_id: i64, recipient_id: &str) -> Result<Option<RecipientRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, recipient_id, read, read_at, notification_sent,
                        email_sent_at, context_access_revoked, created_at
                 FROM message_recipients
                 WHERE message_id = ?1 AND recipient_id = ?2",
            )?;
            let row = stmt
                .query_row(params![message_id, recipient_id], |row| {
                    Ok(RecipientRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        recipient_id: row.get(2)?,
                        read: row.get(3)?,
                        read_at: row.get(4)?,
                        notification_sent: row.get(5)?,
                        email_sent_at: row.get(6)?,
                        context_access_revoked: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    /// Idempotent: only the first call flips `read` and stamps `read_at`.
    /// Returns true when a recipient row exists, whether or not it changed.
    pub fn mark_message_read(&self, recipient_id: &str, message_id: i64, read_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE message_recipients SET read = 1, read_at = ?3
                 WHERE message_id = ?1 AND recipient_id = ?2 AND read = 0",
                params![message_id, recipient_id, read_at],
            )?;
            if changed > 0 {
                return Ok(true);
            }
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM message_recipients
                 WHERE message_id = ?1 AND recipient_id = ?2)",
                params![message_id, recipient_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn mark_all_read(
        &self,
        recipient_id: &str,
        context_type: Option<&str>,
        read_at: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = match context_type {
                Some(ct) => conn.execute(
                    "UPDATE message_recipients SET read = 1, read_at = ?2
                     WHERE recipient_id = ?1 AND read = 0
                       AND message_id IN (SELECT id FROM messages WHERE context_type = ?3)",
                    params![recipient_id, read_at, ct],
                )?,
                None => conn.execute(
                    "UPDATE message_recipients SET read = 1, read_at = ?2
                     WHERE recipient_id = ?1 AND read = 0",
                    params![recipient_id, read_at],
                )?,
            };
            Ok(changed)
        })
    }

    // -- Retrieval --

    pub fn unread_messages(
        &self,
        recipient_id: &str,
        context_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM message_recipients r
                 JOIN messages m ON m.id = r.message_id
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE r.recipient_id = ?1 AND r.read = 0
                   AND r.context_access_revoked = 0
                   AND m.deleted_at IS NULL
                   AND (?2 IS NULL OR m.context_type = ?2)
                 ORDER BY m.created_at DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![recipient_id, context_type, limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn inbox_messages(
        &self,
        recipient_id: &str,
        context_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS}, r.read, r.read_at FROM message_recipients r
                 JOIN messages m ON m.id = r.message_id
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE r.recipient_id = ?1
                   AND r.context_access_revoked = 0
                   AND m.deleted_at IS NULL
                   AND (?2 IS NULL OR m.context_type = ?2)
                 ORDER BY m.created_at DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![recipient_id, context_type, limit, offset], map_inbox_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn sent_messages(
        &self,
        sender_id: &str,
        context_type: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.sender_id = ?1
                   AND m.deleted_at IS NULL
                   AND (?2 IS NULL OR m.context_type = ?2)
                 ORDER BY m.created_at DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![sender_id, context_type, limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn context_messages(
        &self,
        context_type: &str,
        context_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.context_type = ?1 AND m.context_id = ?2
                   AND m.deleted_at IS NULL
                 ORDER BY m.created_at DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![context_type, context_id, limit, offset], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Unread counts grouped by context type. Contextless messages group
    /// under a NULL key.
    pub fn unread_counts_by_context(&self, recipient_id: &str) -> Result<Vec<(Option<String>, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.context_type, COUNT(*) FROM message_recipients r
                 JOIN messages m ON m.id = r.message_id
                 WHERE r.recipient_id = ?1 AND r.read = 0
                   AND r.context_access_revoked = 0
                   AND m.deleted_at IS NULL
                 GROUP BY m.context_type",
            )?;
            let rows = stmt
                .query_map([recipient_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn message_recipient_ids(&self, message_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT recipient_id FROM message_recipients WHERE message_id = ?1")?;
            let rows = stmt
                .query_map([message_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Email fallback queue --

    /// Recipient rows whose fallback email is due: still unread, never
    /// emailed, message still live, delivered before `cutoff`, and with a
    /// recipient address on file.
    pub fn due_email_fallbacks(&self, cutoff: &str, limit: u32) -> Result<Vec<PendingEmailRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.message_id, r.recipient_id, ru.email,
                        COALESCE(su.display_name, su.username, m.sender_id),
                        m.content, m.context_type
                 FROM message_recipients r
                 JOIN messages m ON m.id = r.message_id
                 JOIN users ru ON ru.id = r.recipient_id
                 LEFT JOIN users su ON su.id = m.sender_id
                 WHERE r.read = 0 AND r.email_sent_at IS NULL
                   AND m.deleted_at IS NULL
                   AND ru.email IS NOT NULL
                   AND r.created_at <= ?1
                 ORDER BY r.created_at ASC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cutoff, limit], |row| {
                    Ok(PendingEmailRow {
                        message_id: row.get(0)?,
                        recipient_id: row.get(1)?,
                        recipient_email: row.get(2)?,
                        sender_name: row.get(3)?,
                        content: row.get(4)?,
                        context_type: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Stamp `email_sent_at` exactly once. Returns false when another worker
    /// (or an earlier poll) already stamped it.
    pub fn stamp_email_sent(&self, message_id: i64, recipient_id: &str, sent_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE message_recipients SET email_sent_at = ?3, notification_sent = 1
                 WHERE message_id = ?1 AND recipient_id = ?2 AND email_sent_at IS NULL",
                params![message_id, recipient_id, sent_at],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_notification_sent(&self, message_id: i64, recipient_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE message_recipients SET notification_sent = 1
                 WHERE message_id = ?1 AND recipient_id = ?2",
                params![message_id, recipient_id],
            )?;
            Ok(())
        })
    }
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, content, context_type, context_id, created_at,
                edited_at, edited_content, deleted_at, deleted_by
         FROM messages WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                content: row.get(2)?,
                context_type: row.get(3)?,
                context_id: row.get(4)?,
                created_at: row.get(5)?,
                edited_at: row.get(6)?,
                edited_content: row.get(7)?,
                deleted_at: row.get(8)?,
                deleted_by: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}
