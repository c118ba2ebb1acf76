//! Route table for the relay's public surface.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Anthropic dialect
        .route("/v1/messages", post(api::handle_messages))
        // Gemini dialect
        .route("/v1beta/models/:model_action", post(api::handle_generate))
        // Observability
        .route("/api/status", get(api::handle_status))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}
