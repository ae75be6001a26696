//! Server instance management

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header::HeaderValue, Method};
use axum::Router;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use leflux::{EventBus, EventSink};
use lepilote::{Orchestrator, PipelineSet};
use lepipeline::{LocalObjectStore, ObjectStore};
use lequota::{Capability, CapabilityLimits, QuotaLedger, QuotaLimits};
use leseance::{DirSessionStore, SessionStore};

use crate::auth::{IdentityVerifier, StaticTokenVerifier};
use crate::config::ServeurConfig;
use crate::error::ApiError;
use crate::handlers::{create_router, AppState};

/// LeMentor HTTP/WebSocket server
///
/// Wires the orchestration engine to its collaborators and manages the
/// Axum server lifecycle including startup and graceful shutdown.
pub struct LeMentorServer {
    config: ServeurConfig,
    state: AppState,
}

impl LeMentorServer {
    /// Create new server instance
    pub fn new(config: ServeurConfig) -> Result<Self, ApiError> {
        if let Err(e) = config.validate() {
            return Err(ApiError::internal(format!("Invalid config: {e}")));
        }

        let store: Arc<dyn SessionStore> = Arc::new(
            DirSessionStore::open(&config.data_dir)
                .map_err(|e| ApiError::internal(format!("Failed to open session store: {e}")))?,
        );
        let objects: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::open(&config.media_dir, "/media")
                .map_err(|e| ApiError::internal(format!("Failed to open media store: {e}")))?,
        );

        let mut limits = QuotaLimits::default();
        let video_monthly = limits.for_capability(Capability::VideoGeneration).per_month;
        let voice_monthly = limits.for_capability(Capability::VoiceClone).per_month;
        limits.set(
            Capability::VideoGeneration,
            CapabilityLimits {
                per_day: Some(config.video_daily_limit),
                per_month: video_monthly,
            },
        );
        limits.set(
            Capability::VoiceClone,
            CapabilityLimits {
                per_day: Some(config.voice_daily_limit),
                per_month: voice_monthly,
            },
        );
        let ledger = Arc::new(QuotaLedger::new(limits));

        let bus = Arc::new(EventBus::new());
        let sink: Arc<dyn EventSink> = bus.clone();
        let pipelines = Arc::new(PipelineSet::standard(
            Arc::clone(&objects),
            Arc::clone(&store),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            sink,
            pipelines,
        ));

        let verifier = StaticTokenVerifier::new(config.api_tokens.clone());
        if verifier.is_empty() {
            warn!("no API tokens configured; every authenticated request will be rejected");
        }
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(verifier);

        let state = AppState {
            orchestrator,
            store,
            bus,
            verifier,
            ledger,
            objects,
            config: Arc::new(config.clone()),
        };

        Ok(Self { config, state })
    }

    /// The fully assembled application router, layers included.
    pub fn app(&self) -> Router {
        let mut cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(tower_http::cors::Any);
        let origins: Vec<HeaderValue> = self
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = origin.as_str(), "skipping unparsable CORS origin");
                    None
                }
            })
            .collect();
        cors = cors.allow_origin(origins);

        create_router()
            .with_state(self.state.clone())
            .nest_service("/media", ServeDir::new(&self.config.media_dir))
            .layer(DefaultBodyLimit::max(self.config.max_upload_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ApiError> {
        self.config
            .socket_addr()
            .map_err(|e| ApiError::internal(format!("Failed to parse address: {e}")))
    }

    /// Start the server; returns once shutdown completes.
    pub async fn start(&self) -> Result<(), ApiError> {
        let addr = self.socket_addr()?;
        let app = self.app();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to bind to {addr}: {e}")))?;

        info!(
            "Server listening on: http://{}:{}",
            self.config.host, self.config.port
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal())
            .await
            .map_err(|e| ApiError::internal(format!("Server error: {e}")))
    }

    /// Resolves when Ctrl+C (or TERM on unix) is received.
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Received shutdown signal");
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix;
            unix::signal(unix::SignalKind::terminate())
                .expect("Failed to install TERM handler")
                .recv()
                .await;
            info!("Received TERM signal");
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    /// Shared application state (handlers, tests).
    #[must_use]
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Get server URL
    #[must_use]
    pub fn server_url(&self) -> String {
        self.config.server_url()
    }

    /// Get WebSocket URL
    #[must_use]
    pub fn websocket_url(&self) -> String {
        self.config.websocket_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_server_builds_from_temp_dirs() {
        let dir = tempdir().expect("tempdir");
        let config = ServeurConfig {
            data_dir: dir.path().join("sessions").display().to_string(),
            media_dir: dir.path().join("media").display().to_string(),
            ..Default::default()
        };
        let server = LeMentorServer::new(config);
        assert!(server.is_ok());
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let config = ServeurConfig {
            port: 0,
            ..Default::default()
        };
        assert!(LeMentorServer::new(config).is_err());
    }
}
