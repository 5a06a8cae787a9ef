use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use sandwich_types::api::{Claims, CreateConversationRequest, MessagesResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::messaging::PageQuery;

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let preview = state.service.create_conversation(
        &claims.sub.to_string(),
        req.kind,
        req.name,
        req.participant_ids,
    )?;
    Ok((StatusCode::CREATED, Json(preview)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let previews = state.service.conversation_previews(&claims.sub.to_string())?;
    Ok(Json(previews))
}

pub async fn messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.service.conversation_messages(
        &claims.sub.to_string(),
        &conversation_id,
        crate::messaging::page_from(&query),
    )?;
    Ok(Json(MessagesResponse { messages }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .mark_conversation_read(&claims.sub.to_string(), &conversation_id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}
