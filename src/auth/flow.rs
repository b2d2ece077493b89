use crate::{
    auth::{
        credentials::{CredentialCache, CredentialRecord},
        exchange::TokenExchange,
        state::OneTimeStore,
    },
    config::{CacheConfig, ProviderConfig},
    error::AppError,
    health::{HealthCheckResult, HealthChecker},
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Token set delivered exactly once to the destination that initiated a
/// login. The tokens themselves never travel in a redirect URL; the
/// destination receives a short-lived claim code and trades it in via
/// `POST /auth/claim`.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: i64,
}

/// Drives the authorization-code flow against the configured provider:
/// hands browsers to the consent page, validates the provider's callback,
/// exchanges the code, and parks the issued tokens for claiming.
pub struct AuthFlowService {
    provider: ProviderConfig,
    exchange: Arc<dyn TokenExchange>,
    credentials: CredentialCache,
    pending: OneTimeStore<String>,
    handoff: OneTimeStore<IssuedCredential>,
}

impl AuthFlowService {
    pub fn new(
        provider: ProviderConfig,
        cache_config: &CacheConfig,
        exchange: Arc<dyn TokenExchange>,
        credentials: CredentialCache,
    ) -> Self {
        Self {
            provider,
            exchange,
            credentials,
            pending: OneTimeStore::new(cache_config.pending_ttl_secs),
            handoff: OneTimeStore::new(cache_config.handoff_ttl_secs),
        }
    }

    /// Record the caller's destination and build the provider consent URL.
    /// `access_type=offline` and `prompt=consent` force the provider to
    /// issue a refresh token even on repeat consent.
    pub async fn begin_login(
        &self,
        destination: &str,
        callback_uri: &str,
    ) -> Result<String, AppError> {
        if destination.is_empty() {
            return Err(AppError::BadRequest(
                "missing redirect destination".to_string(),
            ));
        }
        if !self.provider.is_configured() {
            return Err(AppError::NotConfigured(
                "OAuth client id and secret are not configured".to_string(),
            ));
        }

        let state = self.pending.insert(destination.to_string()).await;

        let mut consent_url = Url::parse(&self.provider.authorization_url)
            .map_err(|e| AppError::Internal(format!("invalid authorization URL: {}", e)))?;
        consent_url
            .query_pairs_mut()
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", callback_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.provider.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &state);

        info!(destination = %destination, "Beginning authorization flow");
        Ok(consent_url.into())
    }

    /// Validate the provider callback, exchange the code, store the
    /// resulting record, and return the destination URL with a one-time
    /// claim code appended. `callback_uri` must match the one used in
    /// `begin_login`; providers reject the exchange otherwise.
    pub async fn handle_callback(
        &self,
        state: Option<&str>,
        code: Option<&str>,
        error: Option<&str>,
        callback_uri: &str,
    ) -> Result<String, AppError> {
        if let Some(error) = error {
            warn!(provider_error = %error, "Provider reported an authorization error");
            return Err(AppError::BadRequest(format!(
                "authorization failed at the provider: {}",
                error
            )));
        }

        let state = state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing state parameter".to_string()))?;

        let destination = match self.pending.consume(state).await {
            Some(destination) => destination,
            None => {
                warn!("Rejected callback with unknown or replayed state token");
                return Err(AppError::ReplayOrUnknownState(
                    "state token is unknown, expired, or already used".to_string(),
                ));
            }
        };

        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing authorization code".to_string()))?;

        let response = self.exchange.exchange_code(code, callback_uri).await?;

        self.credentials
            .store(CredentialRecord::from_response(&response, Utc::now()))
            .await;

        let claim_code = self
            .handoff
            .insert(IssuedCredential {
                access_token: response.access_token,
                refresh_token: response.refresh_token,
                expires_in: response.expires_in,
            })
            .await;

        info!(destination = %destination, "Authorization flow completed");
        Ok(append_query_param(&destination, "code", &claim_code))
    }

    /// Trade a claim code for the parked token set. Codes are single-use
    /// and expire quickly, so a leaked redirect URL goes stale on its own.
    pub async fn claim(&self, claim_code: &str) -> Result<IssuedCredential, AppError> {
        match self.handoff.consume(claim_code).await {
            Some(credential) => Ok(credential),
            None => {
                warn!("Rejected claim with unknown or already used code");
                Err(AppError::ReplayOrUnknownState(
                    "claim code is unknown, expired, or already used".to_string(),
                ))
            }
        }
    }

    /// Stateless refresh for callers that manage their own token storage.
    /// Does not touch the shared credential cache.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, AppError> {
        if refresh_token.is_empty() {
            return Err(AppError::BadRequest("missing refresh_token".to_string()));
        }
        let response = self.exchange.refresh(refresh_token).await?;
        Ok(RefreshedToken {
            access_token: response.access_token,
            expires_in: response.expires_in,
        })
    }

    pub fn health_checker(self: &Arc<Self>) -> Arc<dyn HealthChecker> {
        Arc::new(AuthFlowHealthChecker {
            service: Arc::clone(self),
        })
    }
}

/// Append one query parameter to a destination that may be an absolute URL
/// or a bare path.
fn append_query_param(destination: &str, name: &str, value: &str) -> String {
    match Url::parse(destination) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair(name, value);
            url.into()
        }
        Err(_) => {
            let encoded: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair(name, value)
                .finish();
            if destination.contains('?') {
                format!("{}&{}", destination, encoded)
            } else {
                format!("{}?{}", destination, encoded)
            }
        }
    }
}

struct AuthFlowHealthChecker {
    service: Arc<AuthFlowService>,
}

#[async_trait]
impl HealthChecker for AuthFlowHealthChecker {
    fn name(&self) -> &str {
        "auth_flow"
    }

    async fn check(&self) -> HealthCheckResult {
        let details = serde_json::json!({
            "provider_configured": self.service.provider.is_configured(),
            "pending_logins": self.service.pending.len().await,
            "unclaimed_credentials": self.service.handoff.len().await,
        });
        if self.service.provider.is_configured() {
            HealthCheckResult::healthy_with_details(details)
        } else {
            HealthCheckResult::degraded_with_details(
                "OAuth client identity not configured".to_string(),
                details,
            )
        }
    }
}
