use metrelay_log::LogError;
use metrelay_statsd::metric;

use crate::aggregator::EntityAggregator;
use crate::config::TransformConfig;
use crate::payload::{Payload, compose};
use crate::snapshot::MetricSnapshot;
use crate::statsd::TransformTimers;
use crate::time::UnixTimestamp;

/// Receives serialized payloads at the end of a flush cycle.
///
/// Delivery is fire-and-forget: implementations must not block the flush on the network and
/// cannot report failure back to the transform.
pub trait Deliver {
    /// Hands the compact JSON body of a non-empty payload to the transport.
    fn deliver(&self, body: Vec<u8>);
}

impl<F> Deliver for F
where
    F: Fn(Vec<u8>),
{
    fn deliver(&self, body: Vec<u8>) {
        self(body)
    }
}

/// Runs flush cycles over metric snapshots.
///
/// ```
/// use metrelay_transform::{MetricSnapshot, Transform, TransformConfig, UnixTimestamp};
///
/// let transform = Transform::new(TransformConfig::default());
/// let delivery = |_body: Vec<u8>| {};
/// let payload = transform.flush(UnixTimestamp::now(), &MetricSnapshot::default(), &delivery);
///
/// assert!(payload.is_empty());
/// ```
#[derive(Debug)]
pub struct Transform {
    config: TransformConfig,
}

impl Transform {
    /// Creates a transform from its configuration.
    pub fn new(config: TransformConfig) -> Self {
        if config.rules.is_empty() {
            metrelay_log::warn!("no transform rules configured, payloads will be empty");
        } else {
            metrelay_log::debug!(rules = config.rules.len(), "loaded transform rules");
        }

        Self { config }
    }

    /// Returns the configuration of this transform.
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Builds the payload for a snapshot without delivering it.
    pub fn compose(&self, snapshot: &MetricSnapshot) -> Payload {
        let config = &self.config;

        metric!(timer(TransformTimers::FlushDuration), {
            let aggregation = EntityAggregator::new(&config.rules, config.debug).aggregate(snapshot);
            metrelay_log::trace!(
                matched = aggregation.matched,
                invalid = aggregation.invalid,
                entities = aggregation.entities.len(),
                "aggregated snapshot"
            );
            compose(
                &aggregation.entities,
                config.metrics_limit,
                config.send_limit_errors,
            )
        })
    }

    /// Runs one flush cycle.
    ///
    /// The payload is serialized and handed to `delivery` if it carries at least one record. The
    /// composed payload is returned in either case.
    pub fn flush(
        &self,
        timestamp: UnixTimestamp,
        snapshot: &MetricSnapshot,
        delivery: &impl Deliver,
    ) -> Payload {
        let payload = self.compose(snapshot);

        if payload.is_empty() {
            metrelay_log::debug!(%timestamp, "nothing to deliver");
            return payload;
        }

        match payload.to_json() {
            Ok(body) => {
                self.log_payload(timestamp, &payload, &body);
                delivery.deliver(body);
            }
            Err(error) => {
                metrelay_log::error!("failed to serialize payload: {}", LogError(&error));
            }
        }

        payload
    }

    fn log_payload(&self, timestamp: UnixTimestamp, payload: &Payload, body: &[u8]) {
        let records = payload.metrics.len();
        let body = String::from_utf8_lossy(body);

        if self.config.debug {
            metrelay_log::info!(%timestamp, records, payload = %body, "delivering payload");
        } else {
            metrelay_log::debug!(%timestamp, records, payload = %body, "delivering payload");
        }
    }
}
