//! A simple health check endpoint.

use axum::Json;
use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Serialize)]
struct Status {
    is_healthy: bool,
}

/// The process is healthy as long as it serves requests.
pub async fn handle() -> impl IntoResponse {
    Json(Status { is_healthy: true })
}
