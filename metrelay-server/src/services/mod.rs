//! The long-running services of the relay.
//!
//! - [`ingest`] receives statsd datagrams and feeds the snapshot aggregator.
//! - [`flush`] periodically takes snapshots and runs them through the transform.
//! - [`upstream`] posts composed payloads to the collector.
//! - [`server`] hosts the status endpoints.

pub mod flush;
pub mod ingest;
pub mod server;
pub mod upstream;
