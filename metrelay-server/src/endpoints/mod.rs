//! Web server endpoints.

use axum::Router;
use axum::routing::get;

use crate::service::ServiceState;

mod health_check;
mod status;

/// Returns the router with all endpoints of the status server.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/api/status", get(status::handle))
        .route("/api/health", get(health_check::handle))
}
