//! Health endpoints
//!
//! - `/health` - plain "ok" for load balancers
//! - `/live` - liveness probe, healthy while the process runs

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Basic health check - always returns "ok" if the server is running
pub async fn health_check() -> &'static str {
    "ok"
}

/// Liveness probe
///
/// Does not touch the warehouse; a slow warehouse must not restart the pod.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: HealthStatus::Healthy,
            message: Some("Service is alive".to_string()),
        }),
    )
}
