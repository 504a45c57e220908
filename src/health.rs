//! Liveness and readiness endpoints.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tokio::net::TcpListener;

use crate::pipeline::PipelineStats;

/// Anything that can report whether the bus connection is up
pub trait ConnectionStatus: Send + Sync + 'static {
    fn is_connected(&self) -> bool;
}

impl ConnectionStatus for async_nats::Client {
    fn is_connected(&self) -> bool {
        self.connection_state() == async_nats::connection::State::Connected
    }
}

struct HealthState<C> {
    stats: Arc<PipelineStats>,
    connection: C,
}

/// Build the router serving `/health` and `/ready`
pub fn router<C: ConnectionStatus>(stats: Arc<PipelineStats>, connection: C) -> Router {
    let state = Arc::new(HealthState { stats, connection });

    Router::new()
        .route("/health", get(health_check::<C>))
        .route("/ready", get(readiness_check::<C>))
        .with_state(state)
}

/// Serve the health endpoints until the listener fails
pub async fn serve<C: ConnectionStatus>(
    listener: TcpListener,
    stats: Arc<PipelineStats>,
    connection: C,
) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Health endpoint listening on {}", addr);
    }
    axum::serve(listener, router(stats, connection)).await
}

/// Health check endpoint (liveness)
async fn health_check<C: ConnectionStatus>(
    State(state): State<Arc<HealthState<C>>>,
) -> Json<serde_json::Value> {
    let stats = state.stats.snapshot();

    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "messages": {
            "received": stats.received,
            "forwarded": stats.forwarded(),
            "transformed": stats.transformed,
            "passed_through": stats.passed_through,
            "dropped": stats.dropped,
        },
    }))
}

/// Readiness check endpoint - verifies the bus connection
async fn readiness_check<C: ConnectionStatus>(
    State(state): State<Arc<HealthState<C>>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if state.connection.is_connected() {
        Ok(Json(serde_json::json!({
            "status": "ready",
            "service": env!("CARGO_PKG_NAME"),
            "bus": "connected"
        })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
