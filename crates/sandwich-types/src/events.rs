use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageView;
use crate::models::ContextType;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was delivered to this user
    MessageCreate {
        message: MessageView,
        context_type: Option<ContextType>,
        context_id: Option<String>,
    },

    /// A message the user can see was edited within its edit window
    MessageUpdate {
        message_id: i64,
        edited_content: String,
        edited_at: String,
    },

    /// A message was soft-deleted by its sender
    MessageDelete { message_id: i64, deleted_at: String },

    /// A kudos was received for a completed project or task
    KudosReceived { message: MessageView, entity_name: String },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}
