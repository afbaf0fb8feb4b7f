//! Liveness endpoint.

use axum::Json;

use crate::models::HealthResponse;

/// `GET /health`: process is up and serving requests.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: tessera_core::version().to_string(),
    })
}
