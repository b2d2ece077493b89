use crate::error::AppError;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// External base URL used for callback derivation when no forwarded
    /// headers are present (e.g. when running behind no proxy at all).
    pub external_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    /// Whether a usable client identity has been supplied.
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub response_ttl_secs: u64,
    pub pending_ttl_secs: u64,
    pub handoff_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                external_base_url: None,
            },
            provider: ProviderConfig {
                client_id: String::new(),
                client_secret: String::new(),
                authorization_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                scopes: vec![
                    "https://www.googleapis.com/auth/gmail.modify".to_string(),
                    "https://www.googleapis.com/auth/drive".to_string(),
                    "https://www.googleapis.com/auth/calendar".to_string(),
                    "https://www.googleapis.com/auth/contacts".to_string(),
                    "https://www.googleapis.com/auth/userinfo.email".to_string(),
                    "openid".to_string(),
                ],
            },
            upstream: UpstreamConfig {
                base_url: "https://www.googleapis.com".to_string(),
                timeout_secs: 30,
            },
            cache: CacheConfig {
                response_ttl_secs: 300,
                pending_ttl_secs: 600,
                handoff_ttl_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("OAUTH_BRIDGE")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(config::Config::try_from(&Config::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder = builder.add_source(
            Environment::with_prefix("OAUTH_BRIDGE")
                .prefix_separator("_")
                .separator("__"),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate startup-critical settings. A missing client identity is
    /// allowed here; begin_login reports it at use time.
    pub fn validate(&self) -> Result<(), AppError> {
        Url::parse(&self.provider.authorization_url).map_err(|e| {
            AppError::NotConfigured(format!("Invalid provider authorization URL: {}", e))
        })?;
        Url::parse(&self.provider.token_url)
            .map_err(|e| AppError::NotConfigured(format!("Invalid provider token URL: {}", e)))?;
        Url::parse(&self.upstream.base_url)
            .map_err(|e| AppError::NotConfigured(format!("Invalid upstream base URL: {}", e)))?;
        if let Some(base) = &self.server.external_base_url {
            Url::parse(base)
                .map_err(|e| AppError::NotConfigured(format!("Invalid external base URL: {}", e)))?;
        }
        if self.upstream.timeout_secs == 0 {
            return Err(AppError::NotConfigured(
                "Upstream timeout must be positive".to_string(),
            ));
        }
        if self.cache.response_ttl_secs == 0
            || self.cache.pending_ttl_secs == 0
            || self.cache.handoff_ttl_secs == 0
        {
            return Err(AppError::NotConfigured(
                "Cache TTLs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
