use crate::auth::credentials::CredentialCache;
use crate::error::AppError;
use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use tracing::trace;

/// Header used by fronting auth layers (SSO proxies, sidecars) to hand an
/// already-negotiated access token to this service.
static X_FORWARDED_ACCESS_TOKEN: HeaderName = HeaderName::from_static("x-forwarded-access-token");

/// Tokens supplied with a single inbound call. Established per request and
/// carried in request extensions so concurrently running, differently
/// authenticated calls never observe each other's token.
#[derive(Debug, Clone, Default)]
pub struct CallCredentials {
    pub bearer_token: Option<String>,
    pub forwarded_token: Option<String>,
}

impl CallCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer_token = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let forwarded_token = headers
            .get(&X_FORWARDED_ACCESS_TOKEN)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Self {
            bearer_token,
            forwarded_token,
        }
    }
}

/// Extracts call-scoped credentials into request extensions. Never rejects:
/// a request without any explicit token falls through to the shared
/// credential cache when the token is actually resolved.
pub async fn credential_middleware(mut request: Request, next: Next) -> Response {
    let credentials = CallCredentials::from_headers(request.headers());
    if credentials.bearer_token.is_some() {
        trace!(token_source = "bearer", "Call supplied its own credentials");
    } else if credentials.forwarded_token.is_some() {
        trace!(token_source = "forwarded", "Call supplied its own credentials");
    }
    request.extensions_mut().insert(credentials);
    next.run(request).await
}

/// Resolves the access token an upstream call should use. Explicit
/// per-call tokens always win over the shared cache.
#[derive(Clone)]
pub struct CredentialBridge {
    cache: CredentialCache,
}

impl CredentialBridge {
    pub fn new(cache: CredentialCache) -> Self {
        Self { cache }
    }

    /// Resolution order, first match wins: the call's own bearer token, a
    /// token injected by a fronting auth layer, then the credential cache
    /// (which refreshes as needed).
    pub async fn resolve_token(&self, call: &CallCredentials) -> Result<String, AppError> {
        if let Some(token) = &call.bearer_token {
            return Ok(token.clone());
        }
        if let Some(token) = &call.forwarded_token {
            return Ok(token.clone());
        }
        self.cache.get_valid_token().await
    }
}
