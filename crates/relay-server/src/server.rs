//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::directory::Directory;
use crate::websocket::handler::{SessionConfig, accept_session};

/// Errors from binding the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// `host:port` that was requested.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// The bound socket did not report its address.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registered participants.
    pub directory: Arc<Directory>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Monotonic start time for uptime.
    pub start_time: Instant,
    /// Wall-clock start time for `/health`.
    pub started_at: DateTime<Utc>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    directory: Arc<Directory>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: PrometheusHandle,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl RelayServer {
    /// Create a server with an empty directory.
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            directory: Arc::new(Directory::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics_handle,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            directory: Arc::clone(&self.directory),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            started_at: self.started_at,
            metrics: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(cors_layer(&self.config.allowed_origins))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address and the serve task. The task finishes once
    /// [`shutdown`](Self::shutdown) is signalled and in-flight HTTP requests
    /// complete.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let requested = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(%addr, "relay listening");
        Ok((addr, handle))
    }

    /// The participant directory.
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET])
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let directory = Arc::clone(&state.directory);
    let session = SessionConfig {
        outbound_buffer: state.config.outbound_buffer,
        shutdown: state.shutdown.token(),
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = accept_session(socket, directory, session).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.started_at,
        state.directory.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(&state.metrics),
    )
}
