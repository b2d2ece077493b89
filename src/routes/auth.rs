use crate::{
    auth::credentials::CredentialStatus,
    auth::flow::{IssuedCredential, RefreshedToken},
    error::AppError,
    server::Server,
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

pub fn create_auth_routes() -> Router<Server> {
    Router::new()
        .route("/login", get(login_handler))
        .route("/callback", get(callback_handler))
        .route("/claim", post(claim_handler))
        .route("/refresh", post(refresh_handler))
        .route("/status", get(status_handler))
}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub redirect: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub code: Option<String>,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

pub async fn login_handler(
    State(server): State<Server>,
    Query(params): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    let destination = params.redirect.unwrap_or_default();
    let callback_uri =
        build_callback_uri(&headers, server.config.server.external_base_url.as_deref());
    let consent_url = server
        .auth_flow
        .begin_login(&destination, &callback_uri)
        .await?;
    Ok(Redirect::temporary(&consent_url))
}

pub async fn callback_handler(
    State(server): State<Server>,
    Query(params): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<Redirect, AppError> {
    let callback_uri =
        build_callback_uri(&headers, server.config.server.external_base_url.as_deref());
    let destination = server
        .auth_flow
        .handle_callback(
            params.state.as_deref(),
            params.code.as_deref(),
            params.error.as_deref(),
            &callback_uri,
        )
        .await?;
    Ok(Redirect::temporary(&destination))
}

pub async fn claim_handler(
    State(server): State<Server>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<IssuedCredential>, AppError> {
    let code = request.code.unwrap_or_default();
    if code.is_empty() {
        return Err(AppError::BadRequest("missing claim code".to_string()));
    }
    let credential = server.auth_flow.claim(&code).await?;
    Ok(Json(credential))
}

pub async fn refresh_handler(
    State(server): State<Server>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshedToken>, AppError> {
    let refreshed = server
        .auth_flow
        .refresh(request.refresh_token.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(refreshed))
}

pub async fn status_handler(State(server): State<Server>) -> Json<CredentialStatus> {
    Json(server.credentials.status().await)
}

/// Build the externally visible callback URI for this service, supporting
/// reverse proxies. Login and callback must derive the same URI for the same
/// inbound headers; providers validate the exchange against an exact match.
pub fn build_callback_uri(headers: &HeaderMap, external_base: Option<&str>) -> String {
    if let Some(host) = forwarded_host(headers) {
        return format!("{}://{}/auth/callback", forwarded_scheme(headers), host);
    }
    if let Some(base) = external_base {
        return format!("{}/auth/callback", base.trim_end_matches('/'));
    }
    let host = headers
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:3000");
    format!("{}://{}/auth/callback", forwarded_scheme(headers), host)
}

/// Scheme from the usual proxy headers, defaulting to http for direct
/// development traffic.
fn forwarded_scheme(headers: &HeaderMap) -> &'static str {
    if let Some(proto) = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
    {
        if proto.contains("https") {
            return "https";
        }
    }

    if let Some(ssl) = headers.get("x-forwarded-ssl").and_then(|h| h.to_str().ok()) {
        if ssl.eq_ignore_ascii_case("on") {
            return "https";
        }
    }

    if let Some(scheme) = headers.get("x-url-scheme").and_then(|h| h.to_str().ok()) {
        if scheme.eq_ignore_ascii_case("https") {
            return "https";
        }
    }

    "http"
}

/// Host from proxy headers. Takes the first entry when a proxy chain has
/// appended multiple comma-separated hosts.
fn forwarded_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-host")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}
