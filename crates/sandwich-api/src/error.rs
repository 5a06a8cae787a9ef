use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use sandwich_messaging::MessagingError;

/// Maps domain errors onto the HTTP contract: validation problems are 400,
/// authorization failures 403, missing rows 404, and anything from the
/// storage layer a logged 500 with no detail leaked.
pub struct ApiError(pub MessagingError);

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(MessagingError::Db(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MessagingError::NotFound => StatusCode::NOT_FOUND,
            MessagingError::NotSender
            | MessagingError::EditWindowExpired
            | MessagingError::AccessDenied => StatusCode::FORBIDDEN,
            MessagingError::InvalidRecipient(_)
            | MessagingError::NoRecipients
            | MessagingError::EmptyContent
            | MessagingError::ContentTooLong
            | MessagingError::UnsupportedContext(_) => StatusCode::BAD_REQUEST,
            MessagingError::Db(e) => {
                error!("Storage error: {:#}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "internal server error" })),
                )
                    .into_response();
            }
        };

        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
