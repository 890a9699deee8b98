//! The HTTP status server.

use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::TcpListener;

use crate::constants;
use crate::endpoints;
use crate::service::ServiceState;
use crate::shutdown::ShutdownHandle;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] io::Error),

    /// The upstream client could not be created.
    #[error("could not create upstream client")]
    UpstreamClient(#[from] crate::services::upstream::UpstreamError),
}

async fn server_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(constants::SERVER));
    response
}

/// Build the axum application with all routes and middleware.
pub fn make_app(service: ServiceState) -> Router {
    endpoints::routes()
        .layer(middleware::from_fn(server_header))
        .with_state(service)
}

/// HTTP server reporting the flush status.
///
/// The server stops accepting connections when shutdown is triggered.
pub struct HttpServer {
    service: ServiceState,
    listener: TcpListener,
}

impl HttpServer {
    /// Binds the listener for the status server.
    pub async fn bind(addr: SocketAddr, service: ServiceState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { service, listener })
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves requests until shutdown.
    pub async fn run(self, mut shutdown: ShutdownHandle) {
        let Self { service, listener } = self;

        match listener.local_addr() {
            Ok(addr) => metrelay_log::info!("status server listening on http://{addr}"),
            Err(_) => metrelay_log::info!("status server listening"),
        }

        let app = make_app(service);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.notified().await;
                metrelay_log::info!("shutting down status server");
            })
            .await;

        if let Err(error) = result {
            metrelay_log::error!(
                "status server failed: {}",
                metrelay_log::LogError(&error)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::StatusCode;
    use metrelay_transform::UnixTimestamp;
    use parking_lot::RwLock;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::shutdown::Shutdown;
    use crate::status::{FlushStatus, SharedStatus};

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<HeaderValue>, Value) {
        let request = axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let status = response.status();
        let server = response.headers().get(header::SERVER).cloned();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, server, body)
    }

    fn shared_status() -> SharedStatus {
        Arc::new(RwLock::new(FlushStatus::default()))
    }

    #[tokio::test]
    async fn test_health() {
        let app = make_app(ServiceState::new(shared_status()));
        let (status, server, body) = get(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(server.unwrap(), constants::SERVER);
        assert_eq!(body, json!({"is_healthy": true}));
    }

    #[tokio::test]
    async fn test_status_reports_flush() {
        let shared = shared_status();
        {
            let mut status = shared.write();
            status.flush_started(UnixTimestamp::from_secs(1_700_000_000));
            status.delivered(8, 256);
        }

        let app = make_app(ServiceState::new(shared));
        let (status, _, body) = get(app, "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "last_flush": 1_700_000_000,
                "last_exception": null,
                "flush_time": 8,
                "flush_length": 256,
                "last_error": null
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = make_app(ServiceState::new(shared_status()));
        let (status, _, _) = get(app, "/api/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        metrelay_log::init_test!();

        let server = HttpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            ServiceState::new(shared_status()),
        )
        .await
        .unwrap();
        assert!(server.local_addr().is_ok());

        let shutdown = Shutdown::new();
        let task = tokio::spawn(server.run(shutdown.handle()));

        shutdown.trigger();
        task.await.unwrap();
    }
}
