//! Liveness check.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /`: the web client pings this before showing the login page.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "running" })
}
