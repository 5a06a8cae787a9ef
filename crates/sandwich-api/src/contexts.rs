use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use sandwich_types::api::{Claims, SyncMembersRequest};
use sandwich_types::models::ContextType;

use crate::auth::AppState;
use crate::error::ApiError;

/// Replace a project's or task's allow-list. Recipient rows belonging to
/// users who fell off the list are flagged revoked; nothing is deleted.
pub async fn sync_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((context_type, context_id)): Path<(String, String)>,
    Json(req): Json<SyncMembersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let context_type = ContextType::parse(&context_type)
        .ok_or(sandwich_messaging::MessagingError::UnsupportedContext("unknown"))?;

    let revoked = state
        .service
        .sync_context_permissions(context_type, &context_id, req.allowed_user_ids)?;

    info!(
        "{} synced members for {}/{} ({} rows revoked)",
        claims.username, context_type, context_id, revoked
    );

    Ok(Json(serde_json::json!({ "success": true, "revoked": revoked })))
}
