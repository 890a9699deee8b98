//! Configuration for the metrelay CLI and server.
//!
//! The configuration lives in a folder (`.metrelay` by default) containing a `config.yml` file.
//! All sections and values are optional:
//!
//! ```yaml
//! upstream:
//!   host: localhost
//!   port: 8001
//!   path: /v1/data
//! http:
//!   timeout: 5
//!   connection_timeout: 3
//! transform:
//!   metrics_limit: 150
//!   send_limit_errors: true
//!   debug: false
//!   rules:
//!     - matchExpression: ".*redis.*"
//!       metricSchema: "{app}.{service}.{metricName}"
//!       entityType: "Redis Cluster"
//!       entityName: "{app}"
//!       eventType: "RedisSample"
//! ingest:
//!   host: 127.0.0.1
//!   port: 8125
//!   flush_interval: 10
//!   percent_thresholds: [90]
//!   delete_gauges: false
//! status:
//!   enabled: true
//!   host: 127.0.0.1
//!   port: 8126
//! logging:
//!   level: info
//!   format: auto
//! metrics:
//!   statsd: 127.0.0.1:8135
//!   prefix: metrelay
//! ```

#![warn(missing_docs)]

mod config;
mod upstream;

pub use crate::config::*;
pub use crate::upstream::*;
