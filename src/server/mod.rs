use crate::{
    auth::{
        credentials::CredentialCache,
        exchange::{HttpTokenExchange, TokenExchange},
        flow::AuthFlowService,
        middleware::{credential_middleware, CredentialBridge},
    },
    cache::memory::ResponseCache,
    config::Config,
    error::AppError,
    health::HealthService,
    routes::{create_api_routes, create_auth_routes, create_cache_routes, create_health_routes},
    upstream::UpstreamExecutor,
};
use axum::{middleware, Router};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Service container shared with every handler through axum state.
#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub auth_flow: Arc<AuthFlowService>,
    pub credentials: CredentialCache,
    pub response_cache: ResponseCache,
    pub upstream: UpstreamExecutor,
    pub health_service: Arc<HealthService>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        config.validate()?;
        let exchange: Arc<dyn TokenExchange> = Arc::new(HttpTokenExchange::new(&config.provider)?);
        Self::with_exchange(config, exchange).await
    }

    /// Build the server around a caller-supplied token exchange. Tests use
    /// this to substitute a mock provider.
    pub async fn with_exchange(
        config: Config,
        exchange: Arc<dyn TokenExchange>,
    ) -> Result<Self, AppError> {
        let credentials = CredentialCache::new(exchange.clone());
        let response_cache = ResponseCache::new(config.cache.response_ttl_secs);
        let auth_flow = Arc::new(AuthFlowService::new(
            config.provider.clone(),
            &config.cache,
            exchange,
            credentials.clone(),
        ));
        let upstream = UpstreamExecutor::new(
            &config.upstream,
            CredentialBridge::new(credentials.clone()),
            response_cache.clone(),
        )?;

        let health_service = Arc::new(HealthService::new());
        health_service.register(auth_flow.health_checker()).await;
        health_service.register(credentials.health_checker()).await;
        health_service
            .register(response_cache.health_checker())
            .await;

        Ok(Self {
            config: Arc::new(config),
            auth_flow,
            credentials,
            response_cache,
            upstream,
            health_service,
        })
    }

    pub fn create_app(&self) -> Router {
        Router::new()
            .nest("/auth", create_auth_routes())
            .nest("/health", create_health_routes())
            .nest("/cache", create_cache_routes())
            .nest("/api", self.api_routes())
            .with_state(self.clone())
    }

    /// Business-call routes run behind the credential extraction layer.
    fn api_routes(&self) -> Router<Server> {
        create_api_routes().layer(middleware::from_fn(credential_middleware))
    }

    pub async fn run(&self) -> Result<(), AppError> {
        let app = self.create_app();

        let host = self
            .config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| AppError::NotConfigured(format!("Invalid listen host: {}", e)))?;
        let addr = SocketAddr::from((host, self.config.server.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

        info!("Server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
