use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use sandwich_db::models::MessageListRow;
use sandwich_db::{Database, timestamps};
use sandwich_types::api::MessageView;
use sandwich_types::models::ContextType;

use crate::error::{MessagingError, Result};
use crate::notify::Notifier;
use crate::threading;

pub const MAX_CONTENT_CHARS: usize = 5000;
pub const EDIT_WINDOW_MINUTES: i64 = 15;
pub const DELETED_MARKER: &str = "[Message deleted]";

/// Parameters for [`MessagingService::send_message`].
pub struct SendMessage {
    pub sender_id: String,
    pub recipient_ids: Vec<String>,
    pub content: String,
    pub context_type: Option<ContextType>,
    pub context_id: Option<String>,
    pub parent_message_id: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

/// Durable creation, mutation, and retrieval of messages and their
/// per-recipient delivery state. The database is the single source of
/// truth; notification delivery is advisory and never blocks a write.
#[derive(Clone)]
pub struct MessagingService {
    db: Arc<Database>,
    notifier: Notifier,
}

impl MessagingService {
    pub fn new(db: Arc<Database>, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Create one message row plus one unread recipient row per recipient,
    /// thread it, and kick off notifications without waiting on them.
    pub async fn send_message(&self, params: SendMessage) -> Result<MessageView> {
        let SendMessage {
            sender_id,
            recipient_ids,
            content,
            context_type,
            context_id,
            parent_message_id,
        } = params;

        if recipient_ids.is_empty() {
            return Err(MessagingError::NoRecipients);
        }
        let content = validate_content(&content)?;

        if let Some(parent_id) = parent_message_id {
            if self.db.get_message(parent_id)?.is_none() {
                return Err(MessagingError::NotFound);
            }
        }

        let now = timestamps::now();
        let context_type_text = context_type.map(|ct| ct.as_str());
        let message_id = self.db.insert_message(
            &sender_id,
            &content,
            context_type_text,
            context_id.as_deref(),
            &now,
        )?;
        self.db.insert_recipients(message_id, &recipient_ids, &now)?;

        if let Some(parent_id) = parent_message_id {
            threading::attach_reply(&self.db, message_id, parent_id, &now)?;
        } else if let (Some(ct), Some(cid)) = (context_type_text, context_id.as_deref()) {
            threading::auto_thread(&self.db, message_id, ct, cid, &now)?;
        }

        let view = into_view(self.db.message_view(message_id)?.ok_or(MessagingError::NotFound)?);

        // Fire-and-forget: the caller never blocks on (or hears about)
        // delivery; failures are logged inside the notifier.
        let notifier = self.notifier.clone();
        let db = self.db.clone();
        let notify_view = view.clone();
        let recipient_count = recipient_ids.len();
        tokio::spawn(async move {
            notifier.message_sent(&db, notify_view, &recipient_ids).await;
        });

        info!("Message {} sent to {} recipients", message_id, recipient_count);
        Ok(view)
    }

    /// Reply to a message: recipients are the original sender plus the
    /// original recipients, minus the replier; context is inherited.
    pub async fn reply_to_message(
        &self,
        sender_id: &str,
        original_message_id: i64,
        content: String,
    ) -> Result<MessageView> {
        let original = self
            .db
            .get_message(original_message_id)?
            .ok_or(MessagingError::NotFound)?;

        let mut recipient_ids = vec![original.sender_id.clone()];
        recipient_ids.extend(self.db.message_recipient_ids(original_message_id)?);
        let mut seen = std::collections::HashSet::new();
        recipient_ids.retain(|id| id != sender_id && seen.insert(id.clone()));

        self.send_message(SendMessage {
            sender_id: sender_id.to_string(),
            recipient_ids,
            content,
            context_type: original.context_type.as_deref().and_then(ContextType::parse),
            context_id: original.context_id,
            parent_message_id: Some(original_message_id),
        })
        .await
    }

    /// Edit a message's content. Only the original sender may edit, and only
    /// within 15 minutes of creation.
    pub async fn edit_message(
        &self,
        message_id: i64,
        user_id: &str,
        new_content: String,
    ) -> Result<MessageView> {
        let message = self.db.get_message(message_id)?.ok_or(MessagingError::NotFound)?;
        if message.deleted_at.is_some() {
            return Err(MessagingError::NotFound);
        }
        if message.sender_id != user_id {
            return Err(MessagingError::NotSender);
        }

        let created_at = timestamps::parse(&message.created_at)
            .ok_or_else(|| anyhow::anyhow!("unparseable created_at on message {}", message_id))?;
        if Utc::now() - created_at > Duration::minutes(EDIT_WINDOW_MINUTES) {
            return Err(MessagingError::EditWindowExpired);
        }

        let new_content = validate_content(&new_content)?;
        let edited_at = timestamps::now();
        self.db.set_message_edited(message_id, &new_content, &edited_at)?;

        let audience = self.message_audience(message_id, &message.sender_id)?;
        self.notifier
            .message_edited(message_id, &new_content, &edited_at, &audience)
            .await;

        Ok(into_view(
            self.db.message_view(message_id)?.ok_or(MessagingError::NotFound)?,
        ))
    }

    /// Soft-delete a message. The row is retained (threads and kudos keep
    /// their references); content is replaced with a fixed marker.
    pub async fn delete_message(&self, message_id: i64, user_id: &str) -> Result<()> {
        let message = self.db.get_message(message_id)?.ok_or(MessagingError::NotFound)?;
        if message.deleted_at.is_some() {
            return Err(MessagingError::NotFound);
        }
        if message.sender_id != user_id {
            return Err(MessagingError::NotSender);
        }

        let deleted_at = timestamps::now();
        self.db
            .soft_delete_message(message_id, user_id, &deleted_at, DELETED_MARKER)?;

        let audience = self.message_audience(message_id, &message.sender_id)?;
        self.notifier.message_deleted(message_id, &deleted_at, &audience).await;

        Ok(())
    }

    /// Idempotent: re-reading keeps the first read_at. Returns false only
    /// when no recipient row exists for the pair.
    pub fn mark_message_read(&self, recipient_id: &str, message_id: i64) -> Result<bool> {
        Ok(self.db.mark_message_read(recipient_id, message_id, &timestamps::now())?)
    }

    /// Mark every unread row for the recipient (optionally scoped to one
    /// context type) as read. Returns how many rows changed.
    pub fn mark_all_read(&self, recipient_id: &str, context_type: Option<ContextType>) -> Result<usize> {
        Ok(self.db.mark_all_read(
            recipient_id,
            context_type.map(|ct| ct.as_str()),
            &timestamps::now(),
        )?)
    }

    pub fn get_unread_messages(
        &self,
        recipient_id: &str,
        context_type: Option<ContextType>,
        page: Page,
    ) -> Result<Vec<MessageView>> {
        let rows = self.db.unread_messages(
            recipient_id,
            context_type.map(|ct| ct.as_str()),
            page.limit,
            page.offset,
        )?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    pub fn get_inbox_messages(
        &self,
        recipient_id: &str,
        context_type: Option<ContextType>,
        page: Page,
    ) -> Result<Vec<MessageView>> {
        let rows = self.db.inbox_messages(
            recipient_id,
            context_type.map(|ct| ct.as_str()),
            page.limit,
            page.offset,
        )?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    pub fn get_sent_messages(
        &self,
        sender_id: &str,
        context_type: Option<ContextType>,
        page: Page,
    ) -> Result<Vec<MessageView>> {
        let rows = self.db.sent_messages(
            sender_id,
            context_type.map(|ct| ct.as_str()),
            page.limit,
            page.offset,
        )?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    /// Messages of one context, newest first. Callers must pass
    /// [`Self::validate_context_access`] first; this method does not gate.
    pub fn get_context_messages(
        &self,
        context_type: ContextType,
        context_id: &str,
        page: Page,
    ) -> Result<Vec<MessageView>> {
        let rows =
            self.db
                .context_messages(context_type.as_str(), context_id, page.limit, page.offset)?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    /// The whole thread containing `message_id`, depth-first by path.
    pub fn get_thread_messages(&self, message_id: i64) -> Result<Vec<MessageView>> {
        let entry = self.db.thread_entry(message_id)?.ok_or(MessagingError::NotFound)?;
        let rows = self.db.thread_messages(entry.root_message_id)?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    /// Unread counts grouped by context type; contextless messages count
    /// under "none".
    pub fn get_unread_counts(&self, recipient_id: &str) -> Result<HashMap<String, i64>> {
        let rows = self.db.unread_counts_by_context(recipient_id)?;
        Ok(rows
            .into_iter()
            .map(|(ct, count)| (ct.unwrap_or_else(|| "none".to_string()), count))
            .collect())
    }

    /// Authorization gate for context-scoped reads. A false result must be
    /// surfaced as access-denied, not as an empty list.
    pub fn validate_context_access(
        &self,
        user_id: &str,
        context_type: ContextType,
        context_id: &str,
    ) -> Result<bool> {
        let allowed = match context_type {
            // Suggestion boards and direct messages are open to any
            // authenticated user; the recipient rows scope what they see.
            ContextType::Suggestion | ContextType::Direct => true,
            ContextType::Project => self.db.is_assigned_to_project(context_id, user_id)?,
            ContextType::Task => self.db.is_assigned_to_task(context_id, user_id)?,
            ContextType::Group => self.db.is_participant(context_id, user_id)?,
        };
        Ok(allowed)
    }

    /// Replace the membership of a project or task and revoke recipient rows
    /// for users no longer on the list. History is preserved: rows are
    /// flagged, never deleted. Returns the number of rows revoked.
    pub fn sync_context_permissions(
        &self,
        context_type: ContextType,
        context_id: &str,
        allowed_user_ids: Vec<String>,
    ) -> Result<usize> {
        match context_type {
            ContextType::Project => {
                self.db.replace_project_assignments(context_id, &allowed_user_ids)?
            }
            ContextType::Task => self.db.replace_task_assignments(context_id, &allowed_user_ids)?,
            other => return Err(MessagingError::UnsupportedContext(other.as_str())),
        }
        Ok(self
            .db
            .revoke_context_recipients(context_type.as_str(), context_id, &allowed_user_ids)?)
    }

    /// Everyone who should hear about a change to this message: its
    /// recipients plus its sender.
    fn message_audience(&self, message_id: i64, sender_id: &str) -> Result<Vec<String>> {
        let mut audience = self.db.message_recipient_ids(message_id)?;
        audience.push(sender_id.to_string());
        Ok(audience)
    }
}

fn validate_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MessagingError::EmptyContent);
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(MessagingError::ContentTooLong);
    }
    Ok(trimmed.to_string())
}

pub(crate) fn into_view(row: MessageListRow) -> MessageView {
    MessageView {
        id: row.id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        content: row.content,
        context_type: row.context_type.as_deref().and_then(ContextType::parse),
        context_id: row.context_id,
        created_at: row.created_at,
        edited_at: row.edited_at,
        edited_content: row.edited_content,
        read: row.read,
        read_at: row.read_at,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::notify::test_support::RecordingMailer;
    use sandwich_gateway::dispatcher::Dispatcher;

    pub fn service_with_mailer() -> (MessagingService, Arc<RecordingMailer>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = timestamps::now();
        db.create_user("a", "alice", "x", Some("Alice A"), Some("alice@example.org"), &now)
            .unwrap();
        db.create_user("b", "bob", "x", None, Some("bob@example.org"), &now).unwrap();
        db.create_user("c", "carol", "x", None, None, &now).unwrap();
        db.create_user("d", "dave", "x", None, Some("dave@example.org"), &now).unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(Dispatcher::new(), mailer.clone());
        (MessagingService::new(db, notifier), mailer)
    }

    pub fn service() -> MessagingService {
        service_with_mailer().0
    }

    pub fn direct_send(to: &[&str], content: &str) -> SendMessage {
        SendMessage {
            sender_id: "a".to_string(),
            recipient_ids: to.iter().map(|s| s.to_string()).collect(),
            content: content.to_string(),
            context_type: None,
            context_id: None,
            parent_message_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{direct_send, service};
    use super::*;

    #[tokio::test]
    async fn send_fans_out_one_recipient_row_per_recipient() {
        let svc = service();
        let message = svc.send_message(direct_send(&["b", "c", "d"], "hello all")).await.unwrap();

        for recipient in ["b", "c", "d"] {
            let row = svc.db().recipient_row(message.id, recipient).unwrap().unwrap();
            assert!(!row.read);
            assert!(row.read_at.is_none());
            assert!(row.email_sent_at.is_none());
        }
        assert_eq!(svc.db().message_recipient_ids(message.id).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn send_rejects_bad_input() {
        let svc = service();

        let err = svc.send_message(direct_send(&[], "hi")).await.unwrap_err();
        assert!(matches!(err, MessagingError::NoRecipients));

        let err = svc.send_message(direct_send(&["b"], "   ")).await.unwrap_err();
        assert!(matches!(err, MessagingError::EmptyContent));

        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        let err = svc.send_message(direct_send(&["b"], &long)).await.unwrap_err();
        assert!(matches!(err, MessagingError::ContentTooLong));
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_keeps_first_read_at() {
        let svc = service();
        let message = svc.send_message(direct_send(&["b"], "hi")).await.unwrap();

        assert!(svc.mark_message_read("b", message.id).unwrap());
        let first = svc.db().recipient_row(message.id, "b").unwrap().unwrap();
        assert!(first.read);
        let first_read_at = first.read_at.clone().unwrap();

        assert!(svc.mark_message_read("b", message.id).unwrap());
        let second = svc.db().recipient_row(message.id, "b").unwrap().unwrap();
        assert_eq!(second.read_at.unwrap(), first_read_at);
    }

    #[tokio::test]
    async fn mark_read_without_a_recipient_row_reports_false() {
        let svc = service();
        let message = svc.send_message(direct_send(&["b"], "hi")).await.unwrap();
        assert!(!svc.mark_message_read("c", message.id).unwrap());
    }

    #[tokio::test]
    async fn edit_window_enforced_at_fifteen_minutes() {
        let svc = service();

        let too_old = timestamps::to_text(Utc::now() - Duration::minutes(16));
        let old_id = svc.db().insert_message("a", "old", None, None, &too_old).unwrap();
        svc.db().insert_recipients(old_id, &["b".to_string()], &too_old).unwrap();

        let err = svc.edit_message(old_id, "a", "edited".into()).await.unwrap_err();
        assert!(matches!(err, MessagingError::EditWindowExpired));

        let recent = timestamps::to_text(Utc::now() - Duration::minutes(14));
        let recent_id = svc.db().insert_message("a", "recent", None, None, &recent).unwrap();
        svc.db().insert_recipients(recent_id, &["b".to_string()], &recent).unwrap();

        let edited = svc.edit_message(recent_id, "a", "edited".into()).await.unwrap();
        assert_eq!(edited.edited_content.as_deref(), Some("edited"));
        assert!(edited.edited_at.is_some());
    }

    #[tokio::test]
    async fn only_the_sender_may_edit_or_delete() {
        let svc = service();
        let message = svc.send_message(direct_send(&["b"], "hi")).await.unwrap();

        let err = svc.edit_message(message.id, "b", "nope".into()).await.unwrap_err();
        assert!(matches!(err, MessagingError::NotSender));

        let err = svc.delete_message(message.id, "b").await.unwrap_err();
        assert!(matches!(err, MessagingError::NotSender));
    }

    #[tokio::test]
    async fn soft_delete_keeps_the_row_and_references() {
        let svc = service();
        let root = svc
            .send_message(SendMessage {
                context_type: Some(ContextType::Project),
                context_id: Some("p1".to_string()),
                ..direct_send(&["b"], "root message")
            })
            .await
            .unwrap();
        let reply = svc.reply_to_message("b", root.id, "a reply".into()).await.unwrap();

        svc.delete_message(root.id, "a").await.unwrap();

        // Row retained with the deletion marker
        let row = svc.db().get_message(root.id).unwrap().unwrap();
        assert!(row.deleted_at.is_some());
        assert_eq!(row.deleted_by.as_deref(), Some("a"));
        assert_eq!(row.content, DELETED_MARKER);

        // Thread child still points at it
        let child = svc.db().thread_entry(reply.id).unwrap().unwrap();
        assert_eq!(child.parent_message_id, Some(root.id));

        // Excluded from context reads
        let visible = svc
            .get_context_messages(ContextType::Project, "p1", Page::default())
            .unwrap();
        assert!(visible.iter().all(|m| m.id != root.id));
        assert!(visible.iter().any(|m| m.id == reply.id));
    }

    #[tokio::test]
    async fn deleting_twice_reports_not_found() {
        let svc = service();
        let message = svc.send_message(direct_send(&["b"], "hi")).await.unwrap();
        svc.delete_message(message.id, "a").await.unwrap();
        let err = svc.delete_message(message.id, "a").await.unwrap_err();
        assert!(matches!(err, MessagingError::NotFound));
    }

    #[tokio::test]
    async fn reply_targets_original_sender_and_recipients_minus_replier() {
        let svc = service();
        let original = svc.send_message(direct_send(&["b", "c"], "hello")).await.unwrap();

        let reply = svc.reply_to_message("b", original.id, "hi back".into()).await.unwrap();

        let mut recipients = svc.db().message_recipient_ids(reply.id).unwrap();
        recipients.sort();
        assert_eq!(recipients, vec!["a".to_string(), "c".to_string()]);

        // Explicit parent wins over context auto-threading
        let entry = svc.db().thread_entry(reply.id).unwrap().unwrap();
        assert_eq!(entry.parent_message_id, Some(original.id));
    }

    #[tokio::test]
    async fn unread_listing_and_counts_track_read_state() {
        let svc = service();
        let m1 = svc
            .send_message(SendMessage {
                context_type: Some(ContextType::Direct),
                context_id: Some("b".to_string()),
                ..direct_send(&["b"], "one")
            })
            .await
            .unwrap();
        svc.send_message(SendMessage {
            context_type: Some(ContextType::Suggestion),
            context_id: Some("s1".to_string()),
            ..direct_send(&["b"], "two")
        })
        .await
        .unwrap();

        let unread = svc.get_unread_messages("b", None, Page::default()).unwrap();
        assert_eq!(unread.len(), 2);
        // Newest first
        assert!(unread[0].created_at >= unread[1].created_at);

        let counts = svc.get_unread_counts("b").unwrap();
        assert_eq!(counts.get("direct"), Some(&1));
        assert_eq!(counts.get("suggestion"), Some(&1));

        svc.mark_message_read("b", m1.id).unwrap();
        let counts = svc.get_unread_counts("b").unwrap();
        assert_eq!(counts.get("direct"), None);

        let marked = svc.mark_all_read("b", None).unwrap();
        assert_eq!(marked, 1);
        assert!(svc.get_unread_messages("b", None, Page::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoked_recipients_drop_out_of_reads_but_keep_history() {
        let svc = service();
        svc.db().insert_project("p1", "Sandwich Drive", &timestamps::now()).unwrap();
        svc.sync_context_permissions(
            ContextType::Project,
            "p1",
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();

        let message = svc
            .send_message(SendMessage {
                context_type: Some(ContextType::Project),
                context_id: Some("p1".to_string()),
                ..direct_send(&["b"], "project update")
            })
            .await
            .unwrap();

        assert!(svc.validate_context_access("b", ContextType::Project, "p1").unwrap());

        // b is removed from the project
        let revoked = svc
            .sync_context_permissions(ContextType::Project, "p1", vec!["a".to_string()])
            .unwrap();
        assert_eq!(revoked, 1);

        assert!(!svc.validate_context_access("b", ContextType::Project, "p1").unwrap());
        assert!(svc.get_unread_messages("b", None, Page::default()).unwrap().is_empty());
        assert!(svc.get_inbox_messages("b", None, Page::default()).unwrap().is_empty());

        // The row itself is preserved, only flagged
        let row = svc.db().recipient_row(message.id, "b").unwrap().unwrap();
        assert!(row.context_access_revoked);
    }

    #[tokio::test]
    async fn context_access_checks_membership() {
        let svc = service();
        svc.db().insert_project("p1", "Drive", &timestamps::now()).unwrap();
        svc.db().insert_task("t1", "p1", "Count loaves", &timestamps::now()).unwrap();
        svc.sync_context_permissions(ContextType::Task, "t1", vec!["b".to_string()]).unwrap();

        assert!(svc.validate_context_access("b", ContextType::Task, "t1").unwrap());
        assert!(!svc.validate_context_access("a", ContextType::Task, "t1").unwrap());
        // Unknown entity denies rather than leaking existence
        assert!(!svc.validate_context_access("a", ContextType::Project, "ghost").unwrap());
        // Open contexts
        assert!(svc.validate_context_access("a", ContextType::Suggestion, "s9").unwrap());
        assert!(svc.validate_context_access("a", ContextType::Direct, "b").unwrap());
    }

    #[tokio::test]
    async fn thread_retrieval_orders_depth_first() {
        let svc = service();
        let root = svc
            .send_message(SendMessage {
                context_type: Some(ContextType::Task),
                context_id: Some("t1".to_string()),
                ..direct_send(&["b"], "first")
            })
            .await
            .unwrap();
        let second = svc
            .send_message(SendMessage {
                context_type: Some(ContextType::Task),
                context_id: Some("t1".to_string()),
                ..direct_send(&["b"], "second")
            })
            .await
            .unwrap();

        let thread = svc.get_thread_messages(second.id).unwrap();
        let ids: Vec<i64> = thread.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![root.id, second.id]);
    }

    #[tokio::test]
    async fn sent_messages_list_newest_first() {
        let svc = service();
        svc.send_message(direct_send(&["b"], "first")).await.unwrap();
        svc.send_message(direct_send(&["b"], "second")).await.unwrap();

        let sent = svc.get_sent_messages("a", None, Page::default()).unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, "second");
        assert_eq!(sent[0].sender_name, "Alice A");
    }
}
