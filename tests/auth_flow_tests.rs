//! End-to-end authorization flow tests against a wiremock provider.
//!
//! These drive the real HTTP token exchange through the full router, so they
//! catch wiring bugs the per-module tests cannot, such as the callback
//! redirect URI not matching the one sent during the code exchange.

mod common;

use axum::http::StatusCode;
use common::{RequestBuilder, TestHarness, body_json, location};
use oauth_token_bridge::test_utils::TestServerBuilder;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn provider_harness(mock_server: &MockServer) -> TestHarness {
    let server = TestServerBuilder::new()
        .with_provider_urls(
            &format!("{}/o/oauth2/auth", mock_server.uri()),
            &format!("{}/token", mock_server.uri()),
        )
        .build_with_http_exchange()
        .await;
    TestHarness::from_server(server)
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Walk `/auth/login` and return the state parameter from the consent URL.
async fn begin_login(harness: &TestHarness, redirect: &str) -> String {
    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/login?redirect={}",
            redirect
        )))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let consent_url = Url::parse(&location(&response)).unwrap();
    query_param(&consent_url, "state").unwrap()
}

#[tokio::test]
async fn test_full_login_callback_claim_round_trip() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=provider-code-123"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-access-token",
            "refresh_token": "provider-refresh-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid email"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = provider_harness(&mock_server).await;

    // Login redirects to the provider consent page.
    let response = harness
        .make_request(RequestBuilder::get("/auth/login?redirect=/dashboard"))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let consent = location(&response);
    assert!(consent.starts_with(&format!("{}/o/oauth2/auth", mock_server.uri())));

    let consent_url = Url::parse(&consent).unwrap();
    assert_eq!(
        query_param(&consent_url, "client_id").as_deref(),
        Some("test-client-id")
    );
    assert_eq!(
        query_param(&consent_url, "response_type").as_deref(),
        Some("code")
    );
    assert_eq!(
        query_param(&consent_url, "access_type").as_deref(),
        Some("offline")
    );
    assert_eq!(
        query_param(&consent_url, "prompt").as_deref(),
        Some("consent")
    );
    assert!(query_param(&consent_url, "scope").unwrap().contains("openid"));
    let state = query_param(&consent_url, "state").unwrap();
    assert_eq!(state.len(), 43);

    // Provider sends the browser back with an authorization code.
    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}&code=provider-code-123",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let destination = location(&response);
    let (destination_path, query) = destination.split_once('?').unwrap();
    assert_eq!(destination_path, "/dashboard");
    let claim_code = query.strip_prefix("code=").unwrap().to_string();
    assert_ne!(claim_code, state);

    // The claim code trades for the actual tokens exactly once.
    let response = harness
        .make_request(RequestBuilder::post_json(
            "/auth/claim",
            json!({ "code": claim_code }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["access_token"], "provider-access-token");
    assert_eq!(body["refresh_token"], "provider-refresh-token");
    assert_eq!(body["expires_in"], 3600);

    let response = harness
        .make_request(RequestBuilder::post_json(
            "/auth/claim",
            json!({ "code": claim_code }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unknown auth state");

    // Replaying the callback fails too, and never reaches the provider again.
    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}&code=provider-code-123",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The bridge itself is now authenticated.
    let response = harness
        .make_request(RequestBuilder::get("/auth/status"))
        .await;
    let status = body_json(response).await;
    assert_eq!(status["authenticated"], true);
    assert_eq!(status["valid"], true);
    assert_eq!(status["refreshable"], true);
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_rejected() {
    let mock_server = MockServer::start().await;
    let harness = provider_harness(&mock_server).await;

    let response = harness
        .make_request(RequestBuilder::get(
            "/auth/callback?state=never-issued&code=provider-code",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unknown auth state");

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_without_state_is_rejected() {
    let mock_server = MockServer::start().await;
    let harness = provider_harness(&mock_server).await;

    let response = harness
        .make_request(RequestBuilder::get("/auth/callback?code=provider-code"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request");
}

#[tokio::test]
async fn test_provider_error_leaves_login_resumable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-access-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = provider_harness(&mock_server).await;
    let state = begin_login(&harness, "/home").await;

    // A consent denial reports the error without consuming the state.
    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}&error=access_denied",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request");

    // The user can retry consent and complete the same login attempt.
    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}&code=retry-code",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&response).starts_with("/home?code="));
}

#[tokio::test]
async fn test_callback_without_code_consumes_the_state() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-access-token",
            "expires_in": 3600
        })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let harness = provider_harness(&mock_server).await;
    let state = begin_login(&harness, "/home").await;

    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request");

    // The malformed callback burned the state, so a retry needs a new login.
    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}&code=late-code",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unknown auth state");
}

#[tokio::test]
async fn test_failed_exchange_is_surfaced() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = provider_harness(&mock_server).await;
    let state = begin_login(&harness, "/dashboard").await;

    let response = harness
        .make_request(RequestBuilder::get(&format!(
            "/auth/callback?state={}&code=rejected-code",
            state
        )))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Token exchange failed");

    let response = harness
        .make_request(RequestBuilder::get("/auth/status"))
        .await;
    let status = body_json(response).await;
    assert_eq!(status["authenticated"], false);
}

#[tokio::test]
async fn test_stateless_refresh_does_not_touch_cached_credentials() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=stored-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "rotated-access-token",
            "token_type": "Bearer",
            "expires_in": 1800
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let harness = provider_harness(&mock_server).await;

    let response = harness
        .make_request(RequestBuilder::post_json(
            "/auth/refresh",
            json!({ "refresh_token": "stored-refresh-token" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["access_token"], "rotated-access-token");
    assert_eq!(body["expires_in"], 1800);
    assert!(body.get("refresh_token").is_none());

    // The shared credential cache is only written by the callback flow.
    let response = harness
        .make_request(RequestBuilder::get("/auth/status"))
        .await;
    let status = body_json(response).await;
    assert_eq!(status["authenticated"], false);
}

#[tokio::test]
async fn test_refresh_without_token_is_rejected() {
    let mock_server = MockServer::start().await;
    let harness = provider_harness(&mock_server).await;

    let response = harness
        .make_request(RequestBuilder::post_json("/auth/refresh", json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request");

    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_login_requires_redirect_destination() {
    let mock_server = MockServer::start().await;
    let harness = provider_harness(&mock_server).await;

    let response = harness.make_request(RequestBuilder::get("/auth/login")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad request");
}
