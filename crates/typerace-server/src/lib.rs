pub mod db;
pub mod error;
pub mod matches;
pub mod queue;
pub mod registry;
pub mod routes;
pub mod state;
pub mod ws;

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use typerace_core::protocol::ServerEvent;

use crate::queue::CLEANUP_INTERVAL;
use crate::state::AppState;

/// Build a fully configured Router + shared state. Connects the pool,
/// ensures the schema, and starts the queue-cleanup ticker.
pub async fn build_app(db_url: &str) -> (Router, Arc<AppState>) {
    // Every pooled connection to ":memory:" would get its own database, so
    // tests run on a single connection.
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .expect("Failed to connect to database");

    db::ensure_schema(&pool)
        .await
        .expect("Failed to initialize database schema");

    let state = Arc::new(AppState::new(pool));

    let sweep_state = state.clone();
    let cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            sweep_queue(&sweep_state);
        }
    });
    state.set_cleanup_task(cleanup);

    let frontend =
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
    let cors = CorsLayer::new()
        .allow_origin(
            frontend
                .parse::<HeaderValue>()
                .expect("FRONTEND_URL must be a valid origin"),
        )
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/pvp/ranking/{user_id}", get(routes::get_ranking))
        .route("/pvp/leaderboard", get(routes::leaderboard))
        .route("/pvp/queue/join", post(routes::join_queue))
        .route("/pvp/queue/leave", delete(routes::leave_queue))
        .route("/pvp/history/{user_id}", get(routes::match_history))
        .route("/ws", get(ws::ws_upgrade))
        .layer(cors)
        .with_state(state.clone());

    (app, state)
}

/// Evict queue entries that waited too long and tell them about it.
fn sweep_queue(state: &AppState) {
    let evicted = state.queue.evict_stale(Instant::now());
    if evicted.is_empty() {
        return;
    }
    for entry in &evicted {
        info!("queue timeout for {}", entry.user_id);
        state.registry.emit_to_user(
            &entry.user_id,
            &ServerEvent::QueueTimeout {
                message: "Matchmaking timed out, please rejoin".into(),
            },
        );
    }
    state.broadcast_queue_status();
}
