use crate::{
    auth::exchange::{TokenExchange, TokenResponse},
    error::AppError,
    health::{HealthCheckResult, HealthChecker},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Tokens are considered expired this long before their provider-reported
/// expiry, so a token handed to an in-flight upstream call does not lapse
/// mid-request. Clamped to half the reported lifetime for short-lived tokens.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Ceiling on the provider-reported token lifetime. `expires_in` arrives
/// unchecked from the token endpoint; unbounded values overflow the chrono
/// expiry arithmetic.
const MAX_LIFETIME_SECS: i64 = 365 * 86_400;

/// One access/refresh token pair with its computed expiry. Records are
/// replaced whole on every exchange or refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub obtained_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl CredentialRecord {
    /// Build a record from a token-endpoint response. The reported lifetime
    /// is clamped to `1..=MAX_LIFETIME_SECS` and the stored expiry lands
    /// strictly inside it.
    pub fn from_response(response: &TokenResponse, now: DateTime<Utc>) -> Self {
        let lifetime = Duration::seconds(response.expires_in.clamp(1, MAX_LIFETIME_SECS));
        let margin = std::cmp::min(Duration::seconds(EXPIRY_MARGIN_SECS), lifetime / 2);
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            expires_at: now + lifetime - margin,
            obtained_at: now,
            scope: response.scope.clone(),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Credential state as reported by `GET /auth/status`. Never carries the
/// tokens themselves.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub authenticated: bool,
    pub valid: bool,
    pub refreshable: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub obtained_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Process-wide slot holding the current credential record. Reads that find
/// the record expired refresh it through the token exchange; concurrent
/// expired reads are serialized so only one refresh call reaches the
/// provider.
#[derive(Clone)]
pub struct CredentialCache {
    record: Arc<RwLock<Option<CredentialRecord>>>,
    refresh_lock: Arc<Mutex<()>>,
    exchange: Arc<dyn TokenExchange>,
}

impl CredentialCache {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            record: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            exchange,
        }
    }

    /// Replace the held record atomically.
    pub async fn store(&self, record: CredentialRecord) {
        info!(expires_at = %record.expires_at, "Stored credential record");
        let mut slot = self.record.write().await;
        *slot = Some(record);
    }

    /// Return an access token that is valid right now, refreshing the
    /// stored record first if it has expired. Fails with `Unauthenticated`
    /// when there is nothing stored, nothing refreshable, or the provider
    /// rejects the refresh; the caller must redo the login flow in all
    /// three cases.
    pub async fn get_valid_token(&self) -> Result<String, AppError> {
        {
            let record = self.record.read().await;
            match record.as_ref() {
                Some(record) if record.is_valid(Utc::now()) => {
                    return Ok(record.access_token.clone());
                }
                Some(_) => {}
                None => {
                    return Err(AppError::Unauthenticated(
                        "no credentials stored, complete the login flow first".to_string(),
                    ));
                }
            }
        }

        // Serialize refreshes. Whoever wins this lock performs the network
        // call; everyone queued behind re-reads the committed record.
        let _refresh_guard = self.refresh_lock.lock().await;

        let refresh_token = {
            let record = self.record.read().await;
            match record.as_ref() {
                None => {
                    return Err(AppError::Unauthenticated(
                        "no credentials stored, complete the login flow first".to_string(),
                    ));
                }
                Some(record) if record.is_valid(Utc::now()) => {
                    return Ok(record.access_token.clone());
                }
                Some(record) => match &record.refresh_token {
                    Some(token) => token.clone(),
                    None => {
                        return Err(AppError::Unauthenticated(
                            "access token expired and no refresh token is available".to_string(),
                        ));
                    }
                },
            }
        };

        debug!("Cached access token expired, refreshing");
        // The record lock is not held across the network call.
        let response = match self.exchange.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Token refresh failed, re-authentication required");
                return Err(AppError::Unauthenticated(
                    "token refresh failed, complete the login flow again".to_string(),
                ));
            }
        };

        let mut new_record = CredentialRecord::from_response(&response, Utc::now());
        if new_record.refresh_token.is_none() {
            // Providers commonly omit the refresh token on renewal.
            new_record.refresh_token = Some(refresh_token);
        }

        let access_token = new_record.access_token.clone();
        info!(expires_at = %new_record.expires_at, "Access token refreshed");
        let mut slot = self.record.write().await;
        *slot = Some(new_record);
        Ok(access_token)
    }

    pub async fn status(&self) -> CredentialStatus {
        let now = Utc::now();
        let record = self.record.read().await;
        match record.as_ref() {
            Some(record) => CredentialStatus {
                authenticated: true,
                valid: record.is_valid(now),
                refreshable: record.refresh_token.is_some(),
                expires_at: Some(record.expires_at),
                obtained_at: Some(record.obtained_at),
                scope: record.scope.clone(),
            },
            None => CredentialStatus {
                authenticated: false,
                valid: false,
                refreshable: false,
                expires_at: None,
                obtained_at: None,
                scope: None,
            },
        }
    }

    pub fn health_checker(&self) -> Arc<dyn HealthChecker> {
        Arc::new(CredentialHealthChecker {
            cache: self.clone(),
        })
    }
}

struct CredentialHealthChecker {
    cache: CredentialCache,
}

#[async_trait]
impl HealthChecker for CredentialHealthChecker {
    fn name(&self) -> &str {
        "credentials"
    }

    async fn check(&self) -> HealthCheckResult {
        let status = self.cache.status().await;
        let details = serde_json::json!({
            "authenticated": status.authenticated,
            "valid": status.valid,
            "refreshable": status.refreshable,
            "expires_at": status.expires_at.map(|t| t.to_rfc3339()),
        });
        if status.authenticated && !status.valid && !status.refreshable {
            HealthCheckResult::degraded_with_details(
                "Stored credentials expired and cannot be refreshed".to_string(),
                details,
            )
        } else {
            HealthCheckResult::healthy_with_details(details)
        }
    }
}
