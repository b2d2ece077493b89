use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use oauth_token_bridge::{Server, test_utils::TestServerBuilder};
use serde_json::Value;
use tower::ServiceExt;

/// Unified test harness that handles app setup and request dispatch.
pub struct TestHarness {
    #[allow(dead_code)]
    pub server: Server,
    pub app: Router,
}

impl TestHarness {
    /// Harness backed by a mock token exchange and default test config.
    #[allow(dead_code)]
    pub async fn new() -> Self {
        Self::from_server(TestServerBuilder::new().build().await)
    }

    /// Harness around a caller-built server, for tests that point the
    /// provider or upstream at a wiremock instance.
    pub fn from_server(server: Server) -> Self {
        let app = server.create_app();
        Self { server, app }
    }

    /// Make request using the test app
    pub async fn make_request(&self, request: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// Read the full response body and parse it as JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Location header of a redirect response.
#[allow(dead_code)]
pub fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// Unified request builder for the integration suites.
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[allow(dead_code)]
    pub fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Upstream call without any caller credentials.
    #[allow(dead_code)]
    pub fn call(body: Value) -> Request<Body> {
        Self::post_json("/api/call", body)
    }

    /// Upstream call with a caller-supplied bearer token.
    #[allow(dead_code)]
    pub fn call_with_bearer(token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri("/api/call")
            .method("POST")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Upstream call with arbitrary extra headers.
    #[allow(dead_code)]
    pub fn call_with_headers(headers: &[(&str, &str)], body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/api/call")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json");

        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        builder.body(Body::from(body.to_string())).unwrap()
    }
}
