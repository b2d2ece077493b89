use crate::{health::HealthStatus, server::Server};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct HealthCheckQuery {
    #[serde(default)]
    check: Option<String>,
}

pub fn create_health_routes() -> Router<Server> {
    Router::new().route("/", get(health_check))
}

/// Plain liveness without a filter; `?check=all` or `?check=<name>` runs the
/// registered component checks. Unhealthy components turn the response into
/// a 503 so load balancers can react.
async fn health_check(
    State(server): State<Server>,
    Query(params): Query<HealthCheckQuery>,
) -> Response {
    let health = server
        .health_service
        .check_health(params.check.as_deref())
        .await;
    let status = match health.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(health)).into_response()
}
