/// Database row types — these map directly to SQLite rows.
/// Distinct from sandwich-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub content: String,
    pub context_type: Option<String>,
    pub context_id: Option<String>,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub edited_content: Option<String>,
    pub deleted_at: Option<String>,
    pub deleted_by: Option<String>,
}

/// A message joined to its sender's resolved display name and, for
/// recipient-scoped queries, the caller's own read state.
pub struct MessageListRow {
    pub id: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub context_type: Option<String>,
    pub context_id: Option<String>,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub edited_content: Option<String>,
    pub read: Option<bool>,
    pub read_at: Option<String>,
}

pub struct RecipientRow {
    pub id: i64,
    pub message_id: i64,
    pub recipient_id: String,
    pub read: bool,
    pub read_at: Option<String>,
    pub notification_sent: bool,
    pub email_sent_at: Option<String>,
    pub context_access_revoked: bool,
    pub created_at: String,
}

pub struct ThreadRow {
    pub id: i64,
    pub root_message_id: i64,
    pub message_id: i64,
    pub parent_message_id: Option<i64>,
    pub depth: i64,
    pub path: String,
    pub created_at: String,
}

pub struct KudosRow {
    pub id: i64,
    pub sender_id: String,
    pub recipient_id: String,
    pub context_type: String,
    pub context_id: String,
    pub message_id: Option<i64>,
    pub sent_at: String,
}

/// A received kudos joined to its message (if the message still resolves).
pub struct ReceivedKudosRow {
    pub kudos: KudosRow,
    pub message: Option<MessageListRow>,
}

pub struct ConversationRow {
    pub id: String,
    pub kind: String,
    pub name: Option<String>,
    pub created_at: String,
}

/// A conversation from one participant's point of view.
pub struct UserConversationRow {
    pub conversation: ConversationRow,
    pub last_read_at: String,
}

/// One due email-fallback job: an unread, un-emailed recipient row joined to
/// its live message and the recipient's address. Recipients without an
/// address never become jobs.
pub struct PendingEmailRow {
    pub message_id: i64,
    pub recipient_id: String,
    pub recipient_email: String,
    pub sender_name: String,
    pub content: String,
    pub context_type: Option<String>,
}
