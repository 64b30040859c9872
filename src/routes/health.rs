//! Health check with a storage probe.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: StorageStatus,
    pub events_enabled: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StorageStatus {
    pub backend: &'static str,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let started = std::time::Instant::now();
    let connected = match state.repos.health.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("storage probe failed: {e:#}");
            false
        }
    };

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        storage: StorageStatus {
            backend: state.repos.health.backend(),
            connected,
            latency_ms: connected.then(|| started.elapsed().as_millis() as u64),
        },
        events_enabled: state.events.is_enabled(),
        timestamp: state.clock.now().to_rfc3339(),
    })
}
