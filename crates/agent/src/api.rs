//! Health, readiness and self-metrics endpoints of the agent

use agent_lib::{
    collector::{CycleHistory, CycleState},
    health::{ComponentStatus, HealthRegistry, ReadinessResponse},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// State shared between the collection loop and the endpoints
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub cycles: CycleHistory,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, cycles: CycleHistory) -> Self {
        Self {
            health_registry,
            cycles,
        }
    }
}

/// Readiness plus what the collection loop last did
#[derive(Debug, Serialize)]
pub struct ReadyzResponse {
    #[serde(flatten)]
    pub readiness: ReadinessResponse,
    pub cycles: CycleState,
}

/// 200 while healthy or degraded, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        // Partial performance data or missing tags still produce output
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// 200 once a cycle has been published and nothing critical is down
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = ReadyzResponse {
        readiness: state.health_registry.readiness().await,
        cycles: state.cycles.state().await,
    };

    let status_code = if response.readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode agent metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the endpoints until the listener fails
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting agent API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
