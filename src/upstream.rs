use crate::{
    auth::middleware::{CallCredentials, CredentialBridge},
    cache::{cache_key, memory::ResponseCache},
    config::UpstreamConfig,
    error::AppError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// A generic authenticated call against the configured upstream API.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamRequest {
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub params: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Upstream result relayed to the caller. Non-2xx upstream statuses are
/// data here, not errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
    #[serde(default)]
    pub cached: bool,
}

/// The single choke point for business calls: resolves a bearer token via
/// the credential bridge, shields GETs with the response cache, and relays
/// whatever the upstream answered.
#[derive(Clone)]
pub struct UpstreamExecutor {
    http_client: reqwest::Client,
    bridge: CredentialBridge,
    response_cache: ResponseCache,
    base_url: String,
}

impl UpstreamExecutor {
    pub fn new(
        config: &UpstreamConfig,
        bridge: CredentialBridge,
        response_cache: ResponseCache,
    ) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            bridge,
            response_cache,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn execute(
        &self,
        call: &CallCredentials,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, AppError> {
        // Resolved before the cache is consulted: cached responses are only
        // handed to callers holding a usable credential.
        let token = self.bridge.resolve_token(call).await?;

        let method = request.method.to_uppercase();
        let cacheable = method == "GET";
        let key = cache_key(&request.endpoint, request.params.as_ref());

        if cacheable {
            match self.response_cache.get::<UpstreamResponse>(&key).await {
                Ok(Some(mut cached)) => {
                    debug!(endpoint = %request.endpoint, "Serving upstream response from cache");
                    cached.cached = true;
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to read response cache"),
            }
        }

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| AppError::BadRequest(format!("invalid HTTP method: {}", request.method)))?;
        let url = format!(
            "{}/{}",
            self.base_url,
            request.endpoint.trim_start_matches('/')
        );

        let mut upstream = self.http_client.request(method, &url).bearer_auth(&token);
        if let Some(params) = &request.params {
            upstream = upstream.query(params);
        }
        if let Some(body) = &request.body {
            upstream = upstream.json(body);
        }

        let response = upstream.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        let result = UpstreamResponse {
            status,
            body,
            cached: false,
        };

        if cacheable && (200..300).contains(&status) {
            if let Err(e) = self.response_cache.set(&key, &result).await {
                warn!(error = %e, "Failed to cache upstream response");
            }
        }

        Ok(result)
    }
}
