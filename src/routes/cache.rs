use crate::{cache::CacheStats, server::Server};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::info;

pub fn create_cache_routes() -> Router<Server> {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/clear", post(clear_handler))
}

async fn stats_handler(State(server): State<Server>) -> Json<CacheStats> {
    Json(server.response_cache.stats().await)
}

async fn clear_handler(State(server): State<Server>) -> Json<Value> {
    let cleared = server.response_cache.clear().await;
    info!(cleared = cleared, "Response cache cleared by request");
    Json(json!({ "cleared": cleared }))
}
