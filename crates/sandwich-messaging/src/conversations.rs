//! Group-conversation read models.
//!
//! Conversations track read state differently from context messages: each
//! participant carries a `last_read_at` high-water mark, and unread counts
//! are computed against it, not against per-message recipient rows. The two
//! strategies coexist deliberately; do not fold one into the other.

use uuid::Uuid;

use sandwich_db::models::UserConversationRow;
use sandwich_db::timestamps;
use sandwich_types::api::{ConversationPreview, MessageView, ParticipantView};
use sandwich_types::models::ConversationKind;

use crate::error::{MessagingError, Result};
use crate::service::{MessagingService, Page, into_view};

impl MessagingService {
    /// Create a conversation. The creator is always a participant.
    pub fn create_conversation(
        &self,
        creator_id: &str,
        kind: ConversationKind,
        name: Option<String>,
        participant_ids: Vec<String>,
    ) -> Result<ConversationPreview> {
        let id = Uuid::new_v4().to_string();
        let now = timestamps::now();

        self.db().insert_conversation(&id, kind.as_str(), name.as_deref(), &now)?;
        self.db().insert_participant(&id, creator_id, &now)?;
        for participant_id in &participant_ids {
            self.db().insert_participant(&id, participant_id, &now)?;
        }

        Ok(ConversationPreview {
            id: id.clone(),
            kind,
            name,
            participants: self.participant_views(&id)?,
            last_message: None,
            unread_count: 0,
        })
    }

    /// Previews for every conversation the user participates in: the
    /// participant list, the most recent live message, and the unread count
    /// against the user's high-water mark.
    pub fn conversation_previews(&self, user_id: &str) -> Result<Vec<ConversationPreview>> {
        let rows = self.db().user_conversations(user_id)?;

        let mut previews = Vec::with_capacity(rows.len());
        for UserConversationRow { conversation, last_read_at } in rows {
            let kind = ConversationKind::parse(&conversation.kind)
                .ok_or_else(|| anyhow::anyhow!("unknown conversation kind {}", conversation.kind))?;

            let last_message = self
                .db()
                .conversation_last_message(&conversation.id)?
                .map(into_view);
            let unread_count =
                self.db()
                    .conversation_unread_count(&conversation.id, user_id, &last_read_at)?;

            previews.push(ConversationPreview {
                participants: self.participant_views(&conversation.id)?,
                id: conversation.id,
                kind,
                name: conversation.name,
                last_message,
                unread_count,
            });
        }
        Ok(previews)
    }

    /// A conversation's messages, participants only.
    pub fn conversation_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        page: Page,
    ) -> Result<Vec<MessageView>> {
        self.require_participant(conversation_id, user_id)?;
        let rows = self.db().context_messages("group", conversation_id, page.limit, page.offset)?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    /// Advance the caller's high-water mark to now.
    pub fn mark_conversation_read(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        self.require_participant(conversation_id, user_id)?;
        self.db()
            .set_conversation_last_read(conversation_id, user_id, &timestamps::now())?;
        Ok(())
    }

    fn require_participant(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        if self.db().get_conversation(conversation_id)?.is_none() {
            return Err(MessagingError::NotFound);
        }
        if !self.db().is_participant(conversation_id, user_id)? {
            return Err(MessagingError::AccessDenied);
        }
        Ok(())
    }

    fn participant_views(&self, conversation_id: &str) -> Result<Vec<ParticipantView>> {
        Ok(self
            .db()
            .conversation_participants(conversation_id)?
            .into_iter()
            .map(|(user_id, display_name)| ParticipantView { user_id, display_name })
            .collect())
    }
}
