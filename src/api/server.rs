//! API Server
//!
//! Serves the REST host surface until a shutdown signal arrives.

use crate::error::{Error, Result};
use crate::provider::PowerStoreProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::metrics::ProviderMetrics;
use super::rest::RestRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Default REST bind address
pub const DEFAULT_REST_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8090);

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(DEFAULT_REST_ADDR),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

pub struct ApiServer {
    config: ApiServerConfig,
    provider: Arc<PowerStoreProvider>,
    metrics: Arc<ProviderMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, provider: Arc<PowerStoreProvider>) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            provider,
            metrics: Arc::new(ProviderMetrics::new()?),
            shutdown_tx,
        })
    }

    pub fn metrics(&self) -> Arc<ProviderMetrics> {
        self.metrics.clone()
    }

    /// Run the API server until [`ApiServer::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        info!("Starting PowerStore provider API");
        info!("  REST API: {}", self.config.rest_addr);
        info!("  Backend:  {}", self.provider.backend_name());

        let listener = tokio::net::TcpListener::bind(self.config.rest_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind REST server: {}", e)))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        let app = RestRouter::new(self.provider.clone(), self.metrics.clone())
            .build()
            .layer(TraceLayer::new_for_http());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if let Ok(addr) = listener.local_addr() {
            info!("REST API listening on {}", addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|e| {
                error!("REST server error: {}", e);
                Error::Internal(format!("REST server error: {}", e))
            })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.rest_addr.port(), 8090);
        assert!(config.rest_addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let provider = Arc::new(PowerStoreProvider::simulated());
        let server = Arc::new(ApiServer::new(ApiServerConfig::default(), provider).unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let running = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };

        let body = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        server.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
