use thiserror::Error;

/// Domain errors surfaced to the API layer. Notification and email delivery
/// failures never appear here; they are logged and swallowed so the
/// originating write stands.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("message not found")]
    NotFound,

    #[error("only the sender can modify this message")]
    NotSender,

    #[error("edit window has expired (15 minutes)")]
    EditWindowExpired,

    #[error("access denied")]
    AccessDenied,

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("at least one recipient is required")]
    NoRecipients,

    #[error("message content is required")]
    EmptyContent,

    #[error("message content exceeds the maximum length")]
    ContentTooLong,

    #[error("unsupported context type: {0}")]
    UnsupportedContext(&'static str),

    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MessagingError>;
