use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use sandwich_messaging::service::{Page, SendMessage};
use sandwich_types::api::{
    Claims, EditMessageRequest, MarkAllReadRequest, MessagesResponse, ReplyRequest,
    SendMessageRequest, SendMessageResponse,
};
use sandwich_types::models::ContextType;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub context_type: Option<ContextType>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadQuery {
    pub context_type: Option<ContextType>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub group_by_context: bool,
}

fn default_limit() -> u32 {
    50
}

fn page(limit: u32, offset: u32) -> Page {
    Page {
        limit: limit.min(200),
        offset,
    }
}

pub(crate) fn page_from(query: &PageQuery) -> Page {
    page(query.limit, query.offset)
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .service
        .send_message(SendMessage {
            sender_id: claims.sub.to_string(),
            recipient_ids: req.recipient_ids,
            content: req.content,
            context_type: req.context_type,
            context_id: req.context_id,
            parent_message_id: req.parent_message_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message,
        }),
    ))
}

/// Unread messages, or unread counts per context type when
/// `groupByContext=true`.
pub async fn unread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UnreadQuery>,
) -> Result<axum::response::Response, ApiError> {
    let user_id = claims.sub.to_string();

    if query.group_by_context {
        let counts = state.service.get_unread_counts(&user_id)?;
        return Ok(Json(counts).into_response());
    }

    let messages = state.service.get_unread_messages(
        &user_id,
        query.context_type,
        page(query.limit, query.offset),
    )?;
    Ok(Json(MessagesResponse { messages }).into_response())
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.service.get_inbox_messages(
        &claims.sub.to_string(),
        query.context_type,
        page(query.limit, query.offset),
    )?;
    Ok(Json(MessagesResponse { messages }))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.service.get_sent_messages(
        &claims.sub.to_string(),
        query.context_type,
        page(query.limit, query.offset),
    )?;
    Ok(Json(MessagesResponse { messages }))
}

/// Context-scoped reads run through the access gate first; a failed check is
/// a 403, never an empty list.
pub async fn context_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((context_type, context_id)): Path<(String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let context_type = ContextType::parse(&context_type)
        .ok_or(sandwich_messaging::MessagingError::UnsupportedContext("unknown"))?;

    let user_id = claims.sub.to_string();
    if !state
        .service
        .validate_context_access(&user_id, context_type, &context_id)?
    {
        return Err(sandwich_messaging::MessagingError::AccessDenied.into());
    }

    let messages = state.service.get_context_messages(
        context_type,
        &context_id,
        page(query.limit, query.offset),
    )?;
    Ok(Json(MessagesResponse { messages }))
}

pub async fn thread(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.service.get_thread_messages(message_id)?;
    Ok(Json(MessagesResponse { messages }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let success = state
        .service
        .mark_message_read(&claims.sub.to_string(), message_id)?;
    Ok(Json(serde_json::json!({ "success": success })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<Json<MarkAllReadRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let context_type = body.and_then(|Json(req)| req.context_type);
    let count = state
        .service
        .mark_all_read(&claims.sub.to_string(), context_type)?;
    Ok(Json(serde_json::json!({ "success": true, "count": count })))
}

pub async fn edit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .service
        .edit_message(message_id, &claims.sub.to_string(), req.content)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "message": message })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .delete_message(message_id, &claims.sub.to_string())
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Reply derives its recipients from the original message: its sender plus
/// its recipients, minus the replier.
pub async fn reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(message_id): Path<i64>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state
        .service
        .reply_to_message(&claims.sub.to_string(), message_id, req.content)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "reply": reply })),
    ))
}
