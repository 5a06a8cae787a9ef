use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            display_name    TEXT,
            email           TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            context_type    TEXT,
            context_id      TEXT,
            created_at      TEXT NOT NULL,
            edited_at       TEXT,
            edited_content  TEXT,
            deleted_at      TEXT,
            deleted_by      TEXT,
            CHECK (context_type IS NULL
                   OR context_type IN ('suggestion', 'project', 'task', 'direct', 'group')),
            CHECK ((edited_at IS NULL AND edited_content IS NULL)
                   OR (edited_at IS NOT NULL AND edited_content IS NOT NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_context
            ON messages(context_type, context_id) WHERE context_type IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_messages_created_at
            ON messages(created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id);
        CREATE INDEX IF NOT EXISTS idx_messages_deleted
            ON messages(deleted_at) WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS message_recipients (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id              INTEGER NOT NULL REFERENCES messages(id),
            recipient_id            TEXT NOT NULL,
            read                    INTEGER NOT NULL DEFAULT 0,
            read_at                 TEXT,
            notification_sent      INTEGER NOT NULL DEFAULT 0,
            email_sent_at           TEXT,
            context_access_revoked  INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL,
            UNIQUE(message_id, recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_message_recipients_recipient
            ON message_recipients(recipient_id);
        CREATE INDEX IF NOT EXISTS idx_message_recipients_message
            ON message_recipients(message_id);
        CREATE INDEX IF NOT EXISTS idx_message_recipients_unread
            ON message_recipients(recipient_id, read) WHERE read = 0;
        CREATE INDEX IF NOT EXISTS idx_message_recipients_email_pending
            ON message_recipients(recipient_id, read, email_sent_at)
            WHERE read = 0 AND email_sent_at IS NULL;

        CREATE TABLE IF NOT EXISTS message_threads (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            root_message_id     INTEGER REFERENCES messages(id) ON DELETE CASCADE,
            message_id          INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            parent_message_id   INTEGER,
            depth               INTEGER NOT NULL DEFAULT 0 CHECK (depth >= 0),
            path                TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            UNIQUE(message_id)
        );

        CREATE INDEX IF NOT EXISTS idx_thread_root
            ON message_threads(root_message_id);
        CREATE INDEX IF NOT EXISTS idx_thread_path
            ON message_threads(path);

        CREATE TABLE IF NOT EXISTS kudos_tracking (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       TEXT NOT NULL,
            recipient_id    TEXT NOT NULL,
            context_type    TEXT NOT NULL CHECK (context_type IN ('project', 'task')),
            context_id      TEXT NOT NULL,
            message_id      INTEGER REFERENCES messages(id) ON DELETE CASCADE,
            sent_at         TEXT NOT NULL,
            UNIQUE(sender_id, recipient_id, context_type, context_id)
        );

        CREATE INDEX IF NOT EXISTS idx_kudos_recipient
            ON kudos_tracking(recipient_id);
        CREATE INDEX IF NOT EXISTS idx_kudos_context
            ON kudos_tracking(context_type, context_id);

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            kind        TEXT NOT NULL CHECK (kind IN ('direct', 'group', 'channel')),
            name        TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL,
            joined_at       TEXT NOT NULL,
            last_read_at    TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS projects (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS project_tasks (
            id          TEXT PRIMARY KEY,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS project_assignments (
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            PRIMARY KEY (project_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS task_assignments (
            task_id     TEXT NOT NULL REFERENCES project_tasks(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            PRIMARY KEY (task_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
