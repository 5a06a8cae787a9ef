use serde::{Deserialize, Serialize};

/// The entity a message is about. Stored as lowercase text in the messages
/// table; a message with no context (plain notification) has NULL there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Suggestion,
    Project,
    Task,
    Direct,
    Group,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suggestion => "suggestion",
            Self::Project => "project",
            Self::Task => "task",
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "suggestion" => Some(Self::Suggestion),
            "project" => Some(Self::Project),
            "task" => Some(Self::Task),
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contexts a kudos can be sent for. A strict subset of [`ContextType`];
/// the kudos_tracking table carries the same check constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KudosContext {
    Project,
    Task,
}

impl KudosContext {
    pub fn as_context_type(&self) -> ContextType {
        match self {
            Self::Project => ContextType::Project,
            Self::Task => ContextType::Task,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.as_context_type().as_str()
    }
}

/// Conversation container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
    Channel,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            "channel" => Some(Self::Channel),
            _ => None,
        }
    }
}
