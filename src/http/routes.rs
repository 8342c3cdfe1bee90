use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session toggle
        .route("/voice/start", post(handlers::start_voice))
        .route("/voice/stop", post(handlers::stop_voice))
        // Session queries
        .route("/voice/status", get(handlers::voice_status))
        .route("/voice/transcript", get(handlers::voice_transcript))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
