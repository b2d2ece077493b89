use crate::{config::ProviderConfig, error::AppError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Token-endpoint calls never wait longer than this. A stuck provider is
/// surfaced to the caller rather than retried.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider token-endpoint response. Providers routinely omit the refresh
/// token on renewals, so it stays optional here and the caller decides
/// whether to keep the old one.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// The two token-bearing grants this system ever performs.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange an authorization code for a token pair. `redirect_uri`
    /// must be byte-for-byte the URI used in the authorization redirect;
    /// providers validate exact match.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError>;

    /// Obtain a new access token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError>;
}

/// Real client-identity-bearing implementation against the configured
/// provider token endpoint.
pub struct HttpTokenExchange {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl HttpTokenExchange {
    pub fn new(provider: &ProviderConfig) -> Result<Self, AppError> {
        // Token endpoints answer directly; following a redirect here would
        // hand the client secret to whatever the redirect points at.
        let http_client = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http_client,
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            token_url: provider.token_url.clone(),
        })
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AppError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}
