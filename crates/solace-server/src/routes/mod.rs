pub mod conversations;
pub mod turns;

use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/turns", turns::router())
        .nest("/conversations", conversations::router())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
