//! Notification fan-out.
//!
//! Message persistence is the durable guarantee; everything in this module
//! is best-effort. Live gateway events are fire-and-forget, immediate
//! direct-message emails are per-recipient and skip silently on missing
//! addresses, and the unread-fallback email is driven by a poll over the
//! recipient rows themselves. The row is the job record, so pending
//! fallbacks survive a process restart.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sandwich_db::{Database, timestamps};
use sandwich_gateway::dispatcher::Dispatcher;
use sandwich_types::api::MessageView;
use sandwich_types::events::GatewayEvent;
use sandwich_types::models::ContextType;

/// Opaque email collaborator. Swapped for a recording mock in tests.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Email sender backed by the SendGrid v3 HTTP API.
pub struct SendgridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendgridMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailSender for SendgridMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let payload = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });

        let response = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("SendGrid rejected email: {}", response.status());
        }
        Ok(())
    }
}

/// Used when no SendGrid API key is configured: logs instead of sending.
pub struct NoopMailer;

#[async_trait]
impl EmailSender for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        info!("Email notification skipped (no mailer configured): {} -> {}", subject, to);
        Ok(())
    }
}

/// Propagates a sent message to live clients and to email.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Dispatcher,
    mailer: Arc<dyn EmailSender>,
}

impl Notifier {
    pub fn new(dispatcher: Dispatcher, mailer: Arc<dyn EmailSender>) -> Self {
        Self { dispatcher, mailer }
    }

    /// Fan a freshly sent message out to its recipients: a targeted gateway
    /// event per recipient (plus the sender's other sessions), and for
    /// direct messages an immediate email to every recipient with a known
    /// address. Never fails; every delivery error is logged and dropped.
    pub async fn message_sent(&self, db: &Database, message: MessageView, recipient_ids: &[String]) {
        let event = GatewayEvent::MessageCreate {
            message: message.clone(),
            context_type: message.context_type,
            context_id: message.context_id.clone(),
        };

        for user_id in recipient_ids.iter().chain(std::iter::once(&message.sender_id)) {
            self.send_event_to(user_id, event.clone()).await;
        }

        if message.context_type == Some(ContextType::Direct) {
            self.send_direct_message_emails(db, &message, recipient_ids).await;
        }
    }

    pub async fn message_edited(&self, message_id: i64, edited_content: &str, edited_at: &str, user_ids: &[String]) {
        let event = GatewayEvent::MessageUpdate {
            message_id,
            edited_content: edited_content.to_string(),
            edited_at: edited_at.to_string(),
        };
        for user_id in user_ids {
            self.send_event_to(user_id, event.clone()).await;
        }
    }

    pub async fn message_deleted(&self, message_id: i64, deleted_at: &str, user_ids: &[String]) {
        let event = GatewayEvent::MessageDelete {
            message_id,
            deleted_at: deleted_at.to_string(),
        };
        for user_id in user_ids {
            self.send_event_to(user_id, event.clone()).await;
        }
    }

    pub async fn kudos_received(&self, message: &MessageView, entity_name: &str, recipient_id: &str) {
        self.send_event_to(
            recipient_id,
            GatewayEvent::KudosReceived {
                message: message.clone(),
                entity_name: entity_name.to_string(),
            },
        )
        .await;
    }

    async fn send_event_to(&self, user_id: &str, event: GatewayEvent) {
        match user_id.parse::<Uuid>() {
            Ok(uid) => self.dispatcher.send_to_user(uid, event).await,
            Err(_) => debug!("Skipping gateway event for non-UUID user id {}", user_id),
        }
    }

    async fn send_direct_message_emails(&self, db: &Database, message: &MessageView, recipient_ids: &[String]) {
        let subject = format!("New message from {}", message.sender_name);
        let body = format!("{}\n\n{}", subject, message.content);

        for recipient_id in recipient_ids {
            let email = match db.user_email(recipient_id) {
                Ok(Some(email)) => email,
                Ok(None) => continue, // no address on file, skip silently
                Err(e) => {
                    error!("Failed to look up email for {}: {}", recipient_id, e);
                    continue;
                }
            };

            match self.mailer.send(&email, &subject, &body).await {
                Ok(()) => {
                    if let Err(e) = db.set_notification_sent(message.id, recipient_id) {
                        error!("Failed to record notification for {}: {}", recipient_id, e);
                    }
                }
                Err(e) => error!("Failed to send direct message email to {}: {}", recipient_id, e),
            }
        }
    }
}

/// Batch size per poll. Anything left over is picked up on the next tick,
/// so a burst larger than this is delayed, not dropped.
const FALLBACK_BATCH: u32 = 200;

/// One fallback pass: find recipient rows whose message has sat unread past
/// the delay without an email, send the fallback email, and stamp
/// `email_sent_at`. The stamp is guarded by `email_sent_at IS NULL`, so
/// overlapping passes cannot double-send. Returns the number of emails sent.
pub async fn run_due_email_fallbacks(
    db: &Database,
    mailer: &dyn EmailSender,
    delay_minutes: i64,
) -> Result<usize> {
    let cutoff = timestamps::to_text(Utc::now() - chrono::Duration::minutes(delay_minutes));
    let due = db.due_email_fallbacks(&cutoff, FALLBACK_BATCH)?;

    let mut sent = 0;
    for job in due {
        let subject = format!("Unread message from {}", job.sender_name);
        let body = format!(
            "You have an unread message from {}:\n\n{}",
            job.sender_name, job.content
        );

        if let Err(e) = mailer.send(&job.recipient_email, &subject, &body).await {
            // Leave the row unstamped; the next poll retries
            error!(
                "Failed to send fallback email for message {} to {}: {}",
                job.message_id, job.recipient_id, e
            );
            continue;
        }

        if db.stamp_email_sent(job.message_id, &job.recipient_id, &timestamps::now())? {
            sent += 1;
        } else {
            warn!(
                "Fallback email for message {} to {} already stamped by another pass",
                job.message_id, job.recipient_id
            );
        }
    }

    Ok(sent)
}

/// Spawn the fallback poll loop. The schedule lives in the database rows, so
/// restarts pick up where the previous process left off.
pub fn spawn_email_fallback_worker(
    db: Arc<Database>,
    mailer: Arc<dyn EmailSender>,
    delay_minutes: i64,
    poll_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match run_due_email_fallbacks(&db, mailer.as_ref(), delay_minutes).await {
                Ok(0) => {}
                Ok(n) => info!("Sent {} fallback email notifications", n),
                Err(e) => error!("Email fallback pass failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Records every send; used across the crate's tests.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingMailer {
        pub fn sent_to(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(to, _)| to.clone()).collect()
        }
    }

    #[async_trait]
    impl EmailSender for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
            self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    /// Fails every send; for verifying that delivery errors stay contained.
    pub struct FailingMailer;

    #[async_trait]
    impl EmailSender for FailingMailer {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
            anyhow::bail!("smtp unreachable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{FailingMailer, RecordingMailer};
    use super::*;

    fn seed(db: &Database) {
        db.create_user("a", "alice", "x", Some("Alice"), Some("alice@example.org"), &timestamps::now())
            .unwrap();
        db.create_user("b", "bob", "x", None, Some("bob@example.org"), &timestamps::now())
            .unwrap();
        db.create_user("c", "carol", "x", None, None, &timestamps::now()).unwrap();
    }

    /// Insert a message + recipient rows backdated by `minutes_ago`.
    fn backdated_message(db: &Database, recipients: &[&str], minutes_ago: i64) -> i64 {
        let at = timestamps::to_text(Utc::now() - chrono::Duration::minutes(minutes_ago));
        let id = db.insert_message("a", "hello there", None, None, &at).unwrap();
        let ids: Vec<String> = recipients.iter().map(|r| r.to_string()).collect();
        db.insert_recipients(id, &ids, &at).unwrap();
        id
    }

    #[tokio::test]
    async fn fallback_emails_unread_messages_past_the_delay() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let message_id = backdated_message(&db, &["b"], 31);

        let mailer = RecordingMailer::default();
        let sent = run_due_email_fallbacks(&db, &mailer, 30).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(mailer.sent_to(), vec!["bob@example.org".to_string()]);
        let row = db.recipient_row(message_id, "b").unwrap().unwrap();
        assert!(row.email_sent_at.is_some());

        // Second pass is a no-op: email_sent_at is stamped
        let again = run_due_email_fallbacks(&db, &mailer, 30).await.unwrap();
        assert_eq!(again, 0);
        assert_eq!(mailer.sent_to().len(), 1);
    }

    #[tokio::test]
    async fn fallback_skips_messages_not_yet_due() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        backdated_message(&db, &["b"], 5);

        let mailer = RecordingMailer::default();
        assert_eq!(run_due_email_fallbacks(&db, &mailer, 30).await.unwrap(), 0);
        assert!(mailer.sent_to().is_empty());
    }

    #[tokio::test]
    async fn reading_before_the_deadline_suppresses_the_email() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let message_id = backdated_message(&db, &["b"], 45);
        db.mark_message_read("b", message_id, &timestamps::now()).unwrap();

        let mailer = RecordingMailer::default();
        assert_eq!(run_due_email_fallbacks(&db, &mailer, 30).await.unwrap(), 0);

        let row = db.recipient_row(message_id, "b").unwrap().unwrap();
        assert!(row.email_sent_at.is_none());
    }

    #[tokio::test]
    async fn deleted_messages_never_email() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let message_id = backdated_message(&db, &["b"], 45);
        db.soft_delete_message(message_id, "a", &timestamps::now(), "[Message deleted]")
            .unwrap();

        let mailer = RecordingMailer::default();
        assert_eq!(run_due_email_fallbacks(&db, &mailer, 30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recipients_without_an_address_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        backdated_message(&db, &["c"], 45);

        let mailer = RecordingMailer::default();
        assert_eq!(run_due_email_fallbacks(&db, &mailer, 30).await.unwrap(), 0);
        assert!(mailer.sent_to().is_empty());
    }

    #[tokio::test]
    async fn direct_messages_email_immediately_and_skip_missing_addresses() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let now = timestamps::now();
        let message_id = db
            .insert_message("a", "hi there", Some("direct"), Some("b"), &now)
            .unwrap();
        db.insert_recipients(message_id, &["b".to_string(), "c".to_string()], &now)
            .unwrap();
        let view = db.message_view(message_id).unwrap().unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(Dispatcher::new(), mailer.clone());
        notifier
            .message_sent(&db, crate::service::into_view(view), &["b".to_string(), "c".to_string()])
            .await;

        // bob has an address, carol does not
        assert_eq!(mailer.sent_to(), vec!["bob@example.org".to_string()]);
        let row = db.recipient_row(message_id, "b").unwrap().unwrap();
        assert!(row.notification_sent);
        let row = db.recipient_row(message_id, "c").unwrap().unwrap();
        assert!(!row.notification_sent);
    }

    #[tokio::test]
    async fn non_direct_messages_do_not_email_immediately() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let now = timestamps::now();
        let message_id = db
            .insert_message("a", "update", Some("project"), Some("p1"), &now)
            .unwrap();
        db.insert_recipients(message_id, &["b".to_string()], &now).unwrap();
        let view = db.message_view(message_id).unwrap().unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(Dispatcher::new(), mailer.clone());
        notifier.message_sent(&db, crate::service::into_view(view), &["b".to_string()]).await;

        assert!(mailer.sent_to().is_empty());
    }

    #[tokio::test]
    async fn send_failure_leaves_the_row_for_retry() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let message_id = backdated_message(&db, &["b"], 45);

        assert_eq!(run_due_email_fallbacks(&db, &FailingMailer, 30).await.unwrap(), 0);
        let row = db.recipient_row(message_id, "b").unwrap().unwrap();
        assert!(row.email_sent_at.is_none());

        // A later pass with a working mailer picks it back up
        let mailer = RecordingMailer::default();
        assert_eq!(run_due_email_fallbacks(&db, &mailer, 30).await.unwrap(), 1);
    }
}
