use axum::{response::Json, Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

mod agent;
mod clock;
mod config;
mod db;
mod error;
mod google_oauth;
mod groq_client; // 🤖 Chat completions (Groq, OpenAI-compatible)
mod handlers;
mod identity;
mod middleware;
mod models;
mod services;
mod store;

use config::{AppConfig, StoreConfig};
use services::{ChatService, GuestSweeper, ReminderPoller, UserStores};
use store::{DocumentStore, FirebaseStore, MemoryStore, PgStore};

const GUEST_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

// AppState holds the per-user store router, the chat pipeline and sign-in settings
pub struct AppState {
    pub stores: UserStores,
    pub chat: ChatService,
    pub google: Option<google_oauth::GoogleOAuth>,
    pub jwt_secret: String,
    pub store_backend: &'static str,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let durable = match connect_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("❌ Failed to open {} store: {}", config.store.name(), e);
            std::process::exit(1);
        }
    };
    match durable.ping().await {
        Ok(()) => tracing::info!("Document store ready ({})", config.store.name()),
        Err(e) => tracing::warn!("Document store not reachable yet ({}): {}", config.store.name(), e),
    }

    let stores = UserStores::new(durable);
    let clock = clock::LocalClock::new(config.utc_offset);
    let completion = groq_client::CompletionClient::new(
        Arc::new(groq_client::GroqClient::new(&config.completion)),
        config.history_window,
    );

    let google = config.google.clone().map(google_oauth::GoogleOAuth::new);
    if google.is_none() {
        tracing::warn!("Google OAuth not configured - only guest sessions available");
    }

    let shared_state = Arc::new(AppState {
        chat: ChatService::new(stores.clone(), completion, clock),
        stores: stores.clone(),
        google,
        jwt_secret: config.jwt_secret.clone(),
        store_backend: config.store.name(),
    });

    tokio::spawn(GuestSweeper::new(&stores, GUEST_SWEEP_INTERVAL).run());

    // Start background polling for due calendar reminders
    match config.reminder_poll {
        Some(interval) => {
            let poller = ReminderPoller::new(&stores, clock, interval);
            tokio::spawn(poller.run());
        }
        None => tracing::info!("REMINDER_POLL_SECS not set - reminder polling disabled"),
    }

    let app = app(shared_state);

    let listener = match tokio::net::TcpListener::bind(config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("❌ Failed to bind {}: {}", config.http_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("listening on {}", config.http_addr);
    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await {
        tracing::error!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}

pub fn app(shared_state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::auth::auth_routes())
        .merge(handlers::chat::chat_routes())
        .merge(handlers::settings::settings_routes())
        .merge(handlers::calendar::calendar_routes())
        .merge(handlers::account::account_routes())
        .route("/health", axum::routing::get(health))
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state))
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, store::StoreError> {
    let store: Arc<dyn DocumentStore> = match config {
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store - conversations are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreConfig::Postgres { database_url } => Arc::new(PgStore::connect(database_url).await?),
        StoreConfig::Firebase { database_url, auth } => Arc::new(FirebaseStore::new(database_url.clone(), auth.clone())),
    };
    Ok(store)
}

async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let store_ok = state.stores.durable().ping().await.is_ok();
    Json(serde_json::json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store_backend,
    }))
}

// Production-grade logging configuration
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Get log level from environment or default to INFO for production
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,chatmate=trace,sqlx=info,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,chatmate=info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        // JSON logging for production (easier for log aggregation)
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    tracing::info!("💬 Chatmate starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::handlers::tests::{body_json, send, test_state};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_health_reports_store() {
        let state = test_state();
        let response = send(&state, Method::GET, "/health", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let state = test_state();
        let response = send(&state, Method::GET, "/api/nothing-here", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
