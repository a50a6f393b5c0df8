//! Health check endpoint.

use serde::Serialize;

use crate::api::types::Envelope;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /api/health`: liveness check.
pub async fn check() -> Envelope<HealthResponse> {
    Envelope::ok(
        "Service is healthy",
        HealthResponse {
            status: "ok",
            version: crate::config::APP_VERSION,
        },
    )
}
