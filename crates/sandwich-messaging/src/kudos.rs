//! Deduplicated congratulation messages.
//!
//! At most one kudos per (sender, recipient, context) triple. The unique
//! constraint on kudos_tracking is the authority; the pre-insert existence
//! check is only a fast path, so a lost race still comes back as
//! `already_sent` instead of a constraint error.

use sandwich_db::timestamps;
use sandwich_types::api::{KudosRecord, MessageView};
use sandwich_types::models::KudosContext;

use crate::error::{MessagingError, Result};
use crate::service::{MessagingService, SendMessage, into_view};

#[derive(Debug)]
pub struct KudosOutcome {
    /// The kudos message. None when the fast-path check found an existing
    /// record and nothing was sent.
    pub message: Option<MessageView>,
    pub already_sent: bool,
}

impl MessagingService {
    pub async fn send_kudos(
        &self,
        sender_id: &str,
        recipient_id: &str,
        context: KudosContext,
        context_id: &str,
        entity_name: &str,
        content: Option<String>,
    ) -> Result<KudosOutcome> {
        if !self.db().user_exists(recipient_id)? {
            return Err(MessagingError::InvalidRecipient(recipient_id.to_string()));
        }

        if self.has_kudos_sent(sender_id, recipient_id, context, context_id)? {
            return Ok(KudosOutcome {
                message: None,
                already_sent: true,
            });
        }

        let content = content
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| format!("🎉 Kudos! Great job completing {}!", entity_name));

        let message = self
            .send_message(SendMessage {
                sender_id: sender_id.to_string(),
                recipient_ids: vec![recipient_id.to_string()],
                content,
                context_type: Some(context.as_context_type()),
                context_id: Some(context_id.to_string()),
                parent_message_id: None,
            })
            .await?;

        let inserted = self.db().insert_kudos(
            sender_id,
            recipient_id,
            context.as_str(),
            context_id,
            Some(message.id),
            &timestamps::now(),
        )?;

        if !inserted {
            // Lost a concurrent duplicate race; present the same shape the
            // fast path would have
            return Ok(KudosOutcome {
                message: Some(message),
                already_sent: true,
            });
        }

        self.notifier().kudos_received(&message, entity_name, recipient_id).await;

        Ok(KudosOutcome {
            message: Some(message),
            already_sent: false,
        })
    }

    pub fn has_kudos_sent(
        &self,
        sender_id: &str,
        recipient_id: &str,
        context: KudosContext,
        context_id: &str,
    ) -> Result<bool> {
        Ok(self
            .db()
            .kudos_exists(sender_id, recipient_id, context.as_str(), context_id)?)
    }

    /// Kudos received by a user, newest first. Records whose message row or
    /// entity title no longer resolve are omitted rather than surfaced
    /// half-broken.
    pub fn get_received_kudos(&self, user_id: &str) -> Result<Vec<KudosRecord>> {
        let rows = self.db().received_kudos(user_id)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(message) = row.message else { continue };
            let Some(context) = parse_kudos_context(&row.kudos.context_type) else {
                continue;
            };
            let title = match context {
                KudosContext::Project => self.db().project_title(&row.kudos.context_id)?,
                KudosContext::Task => self.db().task_title(&row.kudos.context_id)?,
            };
            let Some(entity_name) = title else { continue };

            let view = into_view(message);
            records.push(KudosRecord {
                id: view.id,
                content: view.edited_content.unwrap_or(view.content),
                sender_id: view.sender_id,
                sender_name: view.sender_name,
                context_type: context,
                context_id: row.kudos.context_id,
                entity_name,
                sent_at: row.kudos.sent_at,
            });
        }
        Ok(records)
    }
}

fn parse_kudos_context(s: &str) -> Option<KudosContext> {
    match s {
        "project" => Some(KudosContext::Project),
        "task" => Some(KudosContext::Task),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::service;

    #[tokio::test]
    async fn kudos_sends_once_then_reports_already_sent() {
        let svc = service();
        svc.db().insert_project("p1", "Sandwich Drive", &timestamps::now()).unwrap();

        let first = svc
            .send_kudos("a", "b", KudosContext::Project, "p1", "Sandwich Drive", None)
            .await
            .unwrap();
        assert!(!first.already_sent);
        let message = first.message.unwrap();
        assert!(message.content.contains("Sandwich Drive"));

        let second = svc
            .send_kudos("a", "b", KudosContext::Project, "p1", "Sandwich Drive", None)
            .await
            .unwrap();
        assert!(second.already_sent);
        assert!(second.message.is_none());

        // Exactly one tracking row for the tuple
        assert!(svc.has_kudos_sent("a", "b", KudosContext::Project, "p1").unwrap());
        let received = svc.get_received_kudos("b").unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].entity_name, "Sandwich Drive");
    }

    #[tokio::test]
    async fn unique_constraint_is_the_authority_under_races() {
        let svc = service();
        let now = timestamps::now();

        // Two concurrent inserts for the same tuple: only the first lands
        assert!(svc.db().insert_kudos("a", "b", "task", "t1", None, &now).unwrap());
        assert!(!svc.db().insert_kudos("a", "b", "task", "t1", None, &now).unwrap());

        // A send that lost the race still reports already_sent
        let outcome = svc
            .send_kudos("a", "b", KudosContext::Task, "t1", "Count loaves", None)
            .await
            .unwrap();
        assert!(outcome.already_sent);
    }

    #[tokio::test]
    async fn distinct_tuples_do_not_collide() {
        let svc = service();
        svc.db().insert_project("p1", "Drive", &timestamps::now()).unwrap();
        svc.db().insert_task("t1", "p1", "Count loaves", &timestamps::now()).unwrap();

        let by_project = svc
            .send_kudos("a", "b", KudosContext::Project, "p1", "Drive", None)
            .await
            .unwrap();
        let by_task = svc
            .send_kudos("a", "b", KudosContext::Task, "t1", "Count loaves", None)
            .await
            .unwrap();
        let other_sender = svc
            .send_kudos("c", "b", KudosContext::Project, "p1", "Drive", None)
            .await
            .unwrap();

        assert!(!by_project.already_sent);
        assert!(!by_task.already_sent);
        assert!(!other_sender.already_sent);
        assert_eq!(svc.get_received_kudos("b").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_recipient_is_rejected() {
        let svc = service();
        let err = svc
            .send_kudos("a", "nobody", KudosContext::Project, "p1", "Drive", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn custom_content_overrides_the_template() {
        let svc = service();
        svc.db().insert_project("p1", "Drive", &timestamps::now()).unwrap();

        let outcome = svc
            .send_kudos("a", "b", KudosContext::Project, "p1", "Drive", Some("You star!".into()))
            .await
            .unwrap();
        assert_eq!(outcome.message.unwrap().content, "You star!");
    }

    #[tokio::test]
    async fn received_kudos_omits_unresolvable_records() {
        let svc = service();
        svc.db().insert_project("p1", "Drive", &timestamps::now()).unwrap();

        svc.send_kudos("a", "b", KudosContext::Project, "p1", "Drive", None).await.unwrap();
        // Entity lookup fails for this one: no such task row
        svc.send_kudos("a", "b", KudosContext::Task, "ghost-task", "Ghost", None)
            .await
            .unwrap();

        let received = svc.get_received_kudos("b").unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].context_id, "p1");
    }
}
