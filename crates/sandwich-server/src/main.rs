use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sandwich_api::auth::{AppState, AppStateInner};
use sandwich_api::routes;
use sandwich_gateway::connection;
use sandwich_gateway::dispatcher::Dispatcher;
use sandwich_messaging::MessagingService;
use sandwich_messaging::notify::{
    EmailSender, NoopMailer, Notifier, SendgridMailer, spawn_email_fallback_worker,
};

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sandwich=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("SANDWICH_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("SANDWICH_DB_PATH").unwrap_or_else(|_| "sandwich.db".into());
    let host = std::env::var("SANDWICH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SANDWICH_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let email_from = std::env::var("SANDWICH_EMAIL_FROM")
        .unwrap_or_else(|_| "noreply@thesandwichproject.org".into());
    let fallback_minutes: i64 = std::env::var("SANDWICH_EMAIL_FALLBACK_MINUTES")
        .unwrap_or_else(|_| "30".into())
        .parse()?;
    let poll_seconds: u64 = std::env::var("SANDWICH_EMAIL_POLL_SECONDS")
        .unwrap_or_else(|_| "60".into())
        .parse()?;

    // Init database
    let db = Arc::new(sandwich_db::Database::open(&PathBuf::from(&db_path))?);

    // Email sender: SendGrid when configured, otherwise log-only
    let mailer: Arc<dyn EmailSender> = match std::env::var("SENDGRID_API_KEY") {
        Ok(key) if !key.is_empty() => Arc::new(SendgridMailer::new(key, email_from)),
        _ => {
            warn!("SENDGRID_API_KEY not set, email notifications are disabled");
            Arc::new(NoopMailer)
        }
    };

    // Shared state
    let dispatcher = Dispatcher::new();
    let notifier = Notifier::new(dispatcher.clone(), mailer.clone());
    let service = MessagingService::new(db.clone(), notifier);

    // Unread-fallback email worker; the pending jobs live in the database,
    // so this picks up wherever a previous process stopped
    spawn_email_fallback_worker(
        db.clone(),
        mailer,
        fallback_minutes,
        Duration::from_secs(poll_seconds),
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        service,
        jwt_secret: jwt_secret.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            dispatcher,
            jwt_secret,
        });

    let app = routes::router(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Sandwich platform listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
