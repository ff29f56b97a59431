//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::instruments::SharedExposition;

/// OpenMetrics text exposition content type.
pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    exposition: SharedExposition,
}

/// Create the HTTP router.
fn create_router(exposition: SharedExposition, metrics_path: &str) -> Router {
    let state = AppState { exposition };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.exposition.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode metrics\n",
            )
                .into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.exposition.is_ready() {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no collection cycle completed yet\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    exposition: SharedExposition,
    listen_addr: SocketAddr,
    metrics_path: String,
}

impl HttpServer {
    pub fn new(exposition: SharedExposition, listen_addr: SocketAddr, metrics_path: String) -> Self {
        Self {
            exposition,
            listen_addr,
            metrics_path,
        }
    }

    /// Bind the listener, so a bind failure surfaces before any polling starts.
    pub async fn bind(&self) -> anyhow::Result<tokio::net::TcpListener> {
        tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr().unwrap_or(self.listen_addr);
        let router = create_router(self.exposition, &self.metrics_path);

        info!(
            addr = %addr,
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
