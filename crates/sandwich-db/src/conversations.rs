use crate::messages::{MESSAGE_COLS, map_message_row};
use crate::models::{ConversationRow, MessageListRow, UserConversationRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::params;

impl Database {
    pub fn insert_conversation(
        &self,
        id: &str,
        kind: &str,
        name: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, kind, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, kind, name, created_at],
            )?;
            Ok(())
        })
    }

    pub fn insert_participant(&self, conversation_id: &str, user_id: &str, joined_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO conversation_participants
                     (conversation_id, user_id, joined_at, last_read_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![conversation_id, user_id, joined_at],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, kind, name, created_at FROM conversations WHERE id = ?1")?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        name: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM conversation_participants
                 WHERE conversation_id = ?1 AND user_id = ?2)",
                params![conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Participants with their display names resolved.
    pub fn conversation_participants(&self, conversation_id: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.user_id, COALESCE(u.display_name, u.username, p.user_id)
                 FROM conversation_participants p
                 LEFT JOIN users u ON u.id = p.user_id
                 WHERE p.conversation_id = ?1
                 ORDER BY p.joined_at ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_conversations(&self, user_id: &str) -> Result<Vec<UserConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.name, c.created_at, p.last_read_at
                 FROM conversation_participants p
                 JOIN conversations c ON c.id = p.conversation_id
                 WHERE p.user_id = ?1
                 ORDER BY c.created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(UserConversationRow {
                        conversation: ConversationRow {
                            id: row.get(0)?,
                            kind: row.get(1)?,
                            name: row.get(2)?,
                            created_at: row.get(3)?,
                        },
                        last_read_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Most recent live message in a conversation (group-context messages
    /// carry the conversation id as their context id).
    pub fn conversation_last_message(&self, conversation_id: &str) -> Result<Option<MessageListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.context_type = 'group' AND m.context_id = ?1
                   AND m.deleted_at IS NULL
                 ORDER BY m.created_at DESC
                 LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt.query_row([conversation_id], map_message_row).optional()?;
            Ok(row)
        })
    }

    /// Unread count against the participant's high-water mark. Own messages
    /// never count as unread.
    pub fn conversation_unread_count(
        &self,
        conversation_id: &str,
        user_id: &str,
        last_read_at: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE context_type = 'group' AND context_id = ?1
                   AND sender_id != ?2
                   AND created_at > ?3
                   AND deleted_at IS NULL",
                params![conversation_id, user_id, last_read_at],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn set_conversation_last_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        last_read_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE conversation_participants SET last_read_at = ?3
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id, last_read_at],
            )?;
            Ok(changed > 0)
        })
    }
}
