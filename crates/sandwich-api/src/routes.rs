use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{contexts, conversations, kudos, messaging};

/// The full HTTP surface minus the WebSocket gateway (wired by the server
/// binary). Hoisted out of main so integration tests can drive it directly.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/messaging/send", post(messaging::send_message))
        .route("/api/messaging/unread", get(messaging::unread))
        .route("/api/messaging/inbox", get(messaging::inbox))
        .route("/api/messaging/sent", get(messaging::sent))
        .route(
            "/api/messaging/context/{context_type}/{context_id}",
            get(messaging::context_messages),
        )
        .route("/api/messaging/mark-all-read", post(messaging::mark_all_read))
        .route("/api/messaging/kudos", post(kudos::send_kudos))
        .route("/api/messaging/kudos/check", get(kudos::check))
        .route("/api/messaging/kudos/received", get(kudos::received))
        .route("/api/messaging/{message_id}/read", post(messaging::mark_read))
        .route("/api/messaging/{message_id}/reply", post(messaging::reply))
        .route("/api/messaging/{message_id}/thread", get(messaging::thread))
        .route(
            "/api/messaging/{message_id}",
            put(messaging::edit).delete(messaging::delete),
        )
        .route(
            "/api/conversations",
            post(conversations::create).get(conversations::list),
        )
        .route(
            "/api/conversations/{conversation_id}/messages",
            get(conversations::messages),
        )
        .route(
            "/api/conversations/{conversation_id}/read",
            post(conversations::mark_read),
        )
        .route(
            "/api/contexts/{context_type}/{context_id}/members",
            post(contexts::sync_members),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
