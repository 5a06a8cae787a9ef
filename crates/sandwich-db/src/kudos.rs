use crate::messages::MESSAGE_COLS;
use crate::models::{KudosRow, ReceivedKudosRow};
use crate::Database;
use anyhow::Result;
use rusqlite::params;

impl Database {
    pub fn kudos_exists(
        &self,
        sender_id: &str,
        recipient_id: &str,
        context_type: &str,
        context_id: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM kudos_tracking
                 WHERE sender_id = ?1 AND recipient_id = ?2
                   AND context_type = ?3 AND context_id = ?4)",
                params![sender_id, recipient_id, context_type, context_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Insert a kudos tracking row. Returns false when the unique constraint
    /// on (sender, recipient, context_type, context_id) rejects the insert,
    /// the authoritative "already sent" signal under concurrent sends.
    pub fn insert_kudos(
        &self,
        sender_id: &str,
        recipient_id: &str,
        context_type: &str,
        context_id: &str,
        message_id: Option<i64>,
        sent_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO kudos_tracking
                     (sender_id, recipient_id, context_type, context_id, message_id, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![sender_id, recipient_id, context_type, context_id, message_id, sent_at],
            );
            match result {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Kudos received by a user, newest first, each joined to its message
    /// (NULL message when the referenced row no longer resolves).
    pub fn received_kudos(&self, recipient_id: &str) -> Result<Vec<ReceivedKudosRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT k.id, k.sender_id, k.recipient_id, k.context_type, k.context_id,
                        k.message_id, k.sent_at,
                        {MESSAGE_COLS}
                 FROM kudos_tracking k
                 LEFT JOIN messages m ON m.id = k.message_id
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE k.recipient_id = ?1
                 ORDER BY k.sent_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([recipient_id], |row| {
                    let kudos = KudosRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        recipient_id: row.get(2)?,
                        context_type: row.get(3)?,
                        context_id: row.get(4)?,
                        message_id: row.get(5)?,
                        sent_at: row.get(6)?,
                    };
                    // LEFT JOIN: message columns are NULL when the row is gone
                    let message_id: Option<i64> = row.get(7)?;
                    let message = match message_id {
                        Some(_) => Some(map_message_row_offset(row, 7)?),
                        None => None,
                    };
                    Ok(ReceivedKudosRow { kudos, message })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_message_row_offset(
    row: &rusqlite::Row<'_>,
    offset: usize,
) -> rusqlite::Result<crate::models::MessageListRow> {
    Ok(crate::models::MessageListRow {
        id: row.get(offset)?,
        sender_id: row.get(offset + 1)?,
        sender_name: row.get(offset + 2)?,
        content: row.get(offset + 3)?,
        context_type: row.get(offset + 4)?,
        context_id: row.get(offset + 5)?,
        created_at: row.get(offset + 6)?,
        edited_at: row.get(offset + 7)?,
        edited_content: row.get(offset + 8)?,
        read: None,
        read_at: None,
    })
}
