//! Shared helpers for unit and integration tests.

use crate::{
    auth::credentials::CredentialRecord,
    auth::exchange::{TokenExchange, TokenResponse},
    config::Config,
    error::AppError,
    server::Server,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Test server builder wiring a mock token exchange by default.
pub struct TestServerBuilder {
    config: Config,
    exchange: Option<Arc<dyn TokenExchange>>,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.provider.client_id = "test-client-id".to_string();
        config.provider.client_secret = "test-client-secret".to_string();
        Self {
            config,
            exchange: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn with_upstream_url(mut self, url: &str) -> Self {
        self.config.upstream.base_url = url.to_string();
        self
    }

    pub fn with_provider_urls(mut self, authorization_url: &str, token_url: &str) -> Self {
        self.config.provider.authorization_url = authorization_url.to_string();
        self.config.provider.token_url = token_url.to_string();
        self
    }

    /// Strip the client identity so NotConfigured paths can be exercised.
    pub fn unconfigured(mut self) -> Self {
        self.config.provider.client_id = String::new();
        self.config.provider.client_secret = String::new();
        self
    }

    pub async fn build(self) -> Server {
        let exchange = self
            .exchange
            .unwrap_or_else(|| Arc::new(MockTokenExchange::new()));
        Server::with_exchange(self.config, exchange)
            .await
            .expect("failed to build test server")
    }

    /// Build with the real HTTP token exchange, pointed at whatever provider
    /// URLs the config carries (integration tests point these at wiremock).
    pub async fn build_with_http_exchange(self) -> Server {
        Server::new(self.config)
            .await
            .expect("failed to build test server")
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting token exchange double. Succeeds with fixed tokens unless told
/// to fail, and can delay refreshes to widen concurrency windows.
pub struct MockTokenExchange {
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    omit_refresh_token: bool,
    refresh_delay: Option<std::time::Duration>,
    fail_exchange: Option<(u16, String)>,
    fail_refresh: Option<(u16, String)>,
}

impl MockTokenExchange {
    pub fn new() -> Self {
        Self {
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            omit_refresh_token: false,
            refresh_delay: None,
            fail_exchange: None,
            fail_refresh: None,
        }
    }

    /// Respond without a refresh token, as providers do on renewals.
    pub fn without_refresh_token(mut self) -> Self {
        self.omit_refresh_token = true;
        self
    }

    pub fn with_refresh_delay(mut self, delay: std::time::Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    pub fn failing_exchange(mut self, status: u16, body: &str) -> Self {
        self.fail_exchange = Some((status, body.to_string()));
        self
    }

    pub fn failing_refresh(mut self, status: u16, body: &str) -> Self {
        self.fail_refresh = Some((status, body.to_string()));
        self
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn token_response(&self) -> TokenResponse {
        TokenResponse {
            access_token: "mock-access-token".to_string(),
            refresh_token: if self.omit_refresh_token {
                None
            } else {
                Some("mock-refresh-token".to_string())
            },
            expires_in: 3600,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }
}

impl Default for MockTokenExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenExchange for MockTokenExchange {
    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((status, body)) = &self.fail_exchange {
            return Err(AppError::ExchangeFailed {
                status: *status,
                body: body.clone(),
            });
        }
        Ok(self.token_response())
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, body)) = &self.fail_refresh {
            return Err(AppError::RefreshFailed {
                status: *status,
                body: body.clone(),
            });
        }
        Ok(self.token_response())
    }
}

/// A credential record that expired half a minute ago.
pub fn expired_record(refresh_token: Option<&str>) -> CredentialRecord {
    CredentialRecord {
        access_token: "expired-access-token".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: Utc::now() - Duration::seconds(30),
        obtained_at: Utc::now() - Duration::seconds(3630),
        scope: None,
    }
}
