//! The metrelay server application.
//!
//! This crate contains the [`run`] function which starts the relay. The relay is made of a few
//! cooperating services on a single-threaded runtime:
//!
//! ```text
//! statsd (udp) --> IngestService --> SnapshotAggregator
//!                                          |
//!                       every flush interval, take snapshot
//!                                          v
//!                  FlushService --> Transform --> UpstreamDelivery --> collector (http)
//!                       |
//!                       v
//!                  FlushStatus <-- HttpServer (/api/status, /api/health)
//! ```
//!
//! The [`IngestService`](services::ingest::IngestService) parses statsd lines and records them in
//! the [`SnapshotAggregator`]. The [`FlushService`](services::flush::FlushService) takes a
//! [`MetricSnapshot`](metrelay_transform::MetricSnapshot) every flush interval and runs one flush
//! cycle of the [`Transform`](metrelay_transform::Transform). Composed payloads are posted to the
//! upstream without waiting for the response. Outcomes are recorded in the shared
//! [`FlushStatus`] which the status server reports.
//!
//! On `SIGINT` or `SIGTERM`, the listeners stop, a final flush runs, and in-flight deliveries
//! are awaited before the process exits.

#![warn(missing_docs)]

mod aggregator;
mod constants;
mod endpoints;
mod protocol;
mod service;
mod shutdown;
mod statsd;
mod status;

pub mod services;

use std::sync::Arc;

use metrelay_config::Config;
use metrelay_transform::Transform;
use parking_lot::Mutex;

pub use self::aggregator::*;
pub use self::protocol::*;
pub use self::service::*;
pub use self::shutdown::*;
pub use self::status::*;

use self::services::flush::FlushService;
use self::services::ingest::IngestService;
pub use self::services::server::ServerError;
use self::services::server::HttpServer;
use self::services::upstream::UpstreamDelivery;

/// Runs the relay until a shutdown signal is received.
///
/// This blocks the current thread. Returns an error if one of the listeners cannot be bound or
/// the upstream client cannot be created.
pub fn run(config: Config) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), ServerError> {
    let status = SharedStatus::default();
    let aggregator = Arc::new(Mutex::new(SnapshotAggregator::new(
        config.percent_thresholds().to_vec(),
        config.delete_gauges(),
    )));

    let delivery = UpstreamDelivery::new(&config, status.clone())?;
    metrelay_log::info!("delivering payloads to {}", delivery.url());

    let ingest = IngestService::bind(
        config.ingest_addr(),
        aggregator.clone(),
        config.max_packet_size(),
    )
    .await?;

    let server = if config.status_enabled() {
        let service = ServiceState::new(status.clone());
        Some(HttpServer::bind(config.status_addr(), service).await?)
    } else {
        None
    };

    let flush = FlushService::new(
        Transform::new(config.transform_config().clone()),
        aggregator,
        delivery,
        status,
        config.flush_interval(),
    );

    let shutdown = Shutdown::new();
    let ingest_task = tokio::spawn(ingest.run(shutdown.handle()));
    let server_task = server.map(|server| tokio::spawn(server.run(shutdown.handle())));

    let signal = async {
        shutdown_signal().await;
        metrelay_log::info!("shutting down");
        shutdown.trigger();
    };

    let (delivery, ()) = tokio::join!(flush.run(shutdown.handle()), signal);
    delivery.drain().await;

    if let Err(error) = ingest_task.await {
        metrelay_log::error!("statsd listener panicked: {}", metrelay_log::LogError(&error));
    }

    if let Some(task) = server_task {
        if let Err(error) = task.await {
            metrelay_log::error!("status server panicked: {}", metrelay_log::LogError(&error));
        }
    }

    metrelay_log::info!("relay stopped");
    Ok(())
}
