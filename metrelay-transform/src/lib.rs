//! Rule matching and payload composition for relayed statsd metrics.
//!
//! Every flush cycle, the statsd aggregator hands over a [`MetricSnapshot`] of counters, counter
//! rates, gauges, timer statistics and sets. The [`Transform`] evaluates an ordered list of
//! [`Rule`]s against every metric name, groups the extracted fields into per-entity event
//! records, and composes a [`Payload`] for the collector.
//!
//! # Rules
//!
//! A rule matches metric names with a regular expression and splits matching names along a
//! dot-delimited schema:
//!
//! ```yaml
//! matchExpression: ".*redis.*"
//! metricSchema: "{app}.{service}.{metricName}"
//! entityType: "Redis Cluster"
//! entityName: "{app}"
//! eventType: "RedisSample"
//! labels:
//!   role: "{service}-primary"
//! ```
//!
//! For the gauge `myapp.redis.used_memory` with value `1024`, this rule produces the event
//! `{"event_type": "RedisSample", "app": "myapp", "service": "redis", "used_memory": 1024,
//! "label.role": "redis-primary"}` for the entity `Redis Cluster:myapp`. The `metricName` field
//! is special: its extracted value names the field that holds the metric value.
//!
//! Metric keys can carry tags in the form `name#key:value,...`. Tags are added to the event as
//! `label.<key>` fields and metrics with different tags are grouped into separate entities.
//!
//! # Flushing
//!
//! ```
//! use metrelay_transform::{MetricSnapshot, Transform, TransformConfig, UnixTimestamp};
//!
//! let config: TransformConfig = serde_json::from_str(r#"{
//!     "rules": [{
//!         "matchExpression": "redis",
//!         "metricSchema": "{app}.{service}.{metricName}",
//!         "entityType": "Redis Cluster",
//!         "entityName": "{app}",
//!         "eventType": "RedisSample"
//!     }]
//! }"#).unwrap();
//!
//! let snapshot: MetricSnapshot = serde_json::from_str(r#"{
//!     "gauges": {"myapp.redis.used_memory": 1024}
//! }"#).unwrap();
//!
//! let transform = Transform::new(config);
//! let payload = transform.flush(UnixTimestamp::now(), &snapshot, &|body: Vec<u8>| {
//!     // hand the body to the transport
//!     assert!(!body.is_empty());
//! });
//!
//! assert_eq!(payload.metrics.len(), 1);
//! ```

#![warn(missing_docs)]

mod aggregator;
mod config;
mod entity;
mod flush;
mod payload;
mod rule;
mod snapshot;
mod statsd;
mod tags;
mod template;
mod time;

pub use aggregator::*;
pub use config::*;
pub use entity::*;
pub use flush::*;
pub use payload::*;
pub use rule::*;
pub use snapshot::*;
pub use tags::*;
pub use template::*;
pub use time::*;
