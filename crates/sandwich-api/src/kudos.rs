use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use sandwich_types::api::{Claims, KudosCheckQuery, SendKudosRequest, SendKudosResponse};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn send_kudos(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendKudosRequest>,
) -> Result<axum::response::Response, ApiError> {
    let outcome = state
        .service
        .send_kudos(
            &claims.sub.to_string(),
            &req.recipient_id,
            req.context_type,
            &req.context_id,
            &req.entity_name,
            req.content,
        )
        .await?;

    // The fast-path duplicate check never sends anything; surface it as a
    // conflict so the UI can disable its button.
    let Some(message) = outcome.message else {
        return Ok((
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Kudos already sent", "alreadySent": true })),
        )
            .into_response());
    };

    Ok((
        StatusCode::CREATED,
        Json(SendKudosResponse {
            success: true,
            message,
            already_sent: outcome.already_sent,
        }),
    )
        .into_response())
}

pub async fn check(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<KudosCheckQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = state.service.has_kudos_sent(
        &claims.sub.to_string(),
        &query.recipient_id,
        query.context_type,
        &query.context_id,
    )?;
    Ok(Json(serde_json::json!({ "sent": sent })))
}

pub async fn received(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let kudos = state.service.get_received_kudos(&claims.sub.to_string())?;
    Ok(Json(kudos))
}
