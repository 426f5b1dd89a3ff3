//! Health check endpoint

use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::ApiState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_connected: bool,
    pub buffer_usage: f64,
    pub version: &'static str,
}

/// Collapse reachability and buffer pressure into one status label.
/// Buffer saturation outranks a lost database connection.
pub fn health_status(db_connected: bool, buffer_usage: f64) -> &'static str {
    if buffer_usage > 0.9 {
        "unhealthy"
    } else if !db_connected {
        "degraded"
    } else {
        "healthy"
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Collector health state", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let db_connected = state.db_connected.load(Ordering::Relaxed);
    let buffer_usage = state.buffer.usage();

    Json(HealthResponse {
        status: health_status(db_connected, buffer_usage),
        db_connected,
        buffer_usage,
        version: env!("CARGO_PKG_VERSION"),
    })
}
