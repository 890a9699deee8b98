//! Reports the outcome of recent flush cycles.

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::service::ServiceState;

pub async fn handle(State(state): State<ServiceState>) -> impl IntoResponse {
    let status = state.status().read().clone();
    Json(status)
}
