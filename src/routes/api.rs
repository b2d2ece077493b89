use crate::{
    auth::middleware::CallCredentials,
    error::AppError,
    server::Server,
    upstream::{UpstreamRequest, UpstreamResponse},
};
use axum::{extract::State, response::Json, routing::post, Extension, Router};

pub fn create_api_routes() -> Router<Server> {
    Router::new().route("/call", post(call_handler))
}

/// Generic authenticated upstream call. The credential middleware has
/// already stashed any call-supplied tokens in the request extensions.
async fn call_handler(
    State(server): State<Server>,
    Extension(credentials): Extension<CallCredentials>,
    Json(request): Json<UpstreamRequest>,
) -> Result<Json<UpstreamResponse>, AppError> {
    let response = server.upstream.execute(&credentials, request).await?;
    Ok(Json(response))
}
