//! # HTTP Server
//!
//! Combines the sigil and observability routers behind CORS and a body
//! size limit, and runs them until Ctrl-C.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::config::HttpServerConfig;
use super::observability_routes::{health_routes, observability_routes};
use super::sigil_routes::{sigil_routes, SigilState};
use crate::observability::{Event, Logger};

/// HTTP server for the sigil registry
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server over shared registry state
    pub fn with_config(config: HttpServerConfig, state: Arc<SigilState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, state: Arc<SigilState>) -> Router {
        let metrics = Arc::clone(state.store.metrics());

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .nest("/sigils", sigil_routes(state))
            .nest("/observability", observability_routes(metrics))
            .layer(DefaultBodyLimit::max(config.max_body_bytes))
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Start the HTTP server and serve until Ctrl-C
    pub async fn start(self) -> io::Result<()> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid socket address {}: {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        Logger::event(Event::Serving).field("addr", bound).info();

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Logger::event(Event::ShutdownComplete).info();
        Ok(())
    }
}

async fn shutdown_signal() {
    // If the handler cannot be installed, run until killed.
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    Logger::event(Event::ShutdownStart).info();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_server::sigil_routes::ListingLimits;
    use crate::merge::MergeEngine;
    use crate::observability::MetricsRegistry;
    use crate::registry::{MemoryPersistence, RegistryStore};
    use crate::token::TokenNormalizer;

    fn state() -> Arc<SigilState> {
        let engine = MergeEngine::new(TokenNormalizer::standard().unwrap(), 8, 100);
        let store = RegistryStore::open(
            engine,
            0,
            Arc::new(MemoryPersistence::new()),
            Arc::new(MetricsRegistry::new()),
        )
        .unwrap();
        Arc::new(SigilState::new(Arc::new(store), ListingLimits::default()))
    }

    #[test]
    fn test_server_with_custom_port() {
        let server = HttpServer::with_config(HttpServerConfig::with_port(8080), state());
        assert_eq!(server.socket_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_router_builds_with_cors_list() {
        let config = HttpServerConfig {
            cors_origins: vec!["http://localhost:5173".to_string()],
            ..HttpServerConfig::default()
        };
        let _router = HttpServer::with_config(config, state()).router();
    }
}
