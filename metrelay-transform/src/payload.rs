use indexmap::IndexMap;
use metrelay_statsd::metric;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::entity::{EntityMap, Fields};
use crate::statsd::{TransformCounters, TransformHistograms};

/// Integration name reported in every payload.
pub const INTEGRATION_NAME: &str = "com.newrelic.statsd";

/// Version of the payload protocol.
pub const PROTOCOL_VERSION: &str = "1";

/// Event type of the record sent in place of an event that exceeded the field limit.
pub const LIMIT_ERROR_EVENT_TYPE: &str = "StatsdLimitErrorSample";

/// A single record in the `metrics` list of a [`Payload`].
#[derive(Clone, Debug, PartialEq)]
pub enum EventRecord {
    /// A regular event with the fields collected for one entity.
    Sample {
        /// The event type of the rule that produced the fields.
        event_type: String,
        /// The collected fields.
        fields: Fields,
    },
    /// Sent instead of an event whose field count exceeded the configured limit.
    LimitError {
        /// Number of fields of the suppressed event.
        number_of_metrics: usize,
        /// The configured limit.
        configured_limit: usize,
    },
}

impl EventRecord {
    /// Returns the event type written to the `event_type` key.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Sample { event_type, .. } => event_type,
            Self::LimitError { .. } => LIMIT_ERROR_EVENT_TYPE,
        }
    }
}

impl Serialize for EventRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Sample { event_type, fields } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("event_type", event_type)?;
                for (name, value) in fields {
                    // The event type key is reserved for the record itself.
                    if name != "event_type" {
                        map.serialize_entry(name, value)?;
                    }
                }
                map.end()
            }
            Self::LimitError {
                number_of_metrics,
                configured_limit,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("event_type", LIMIT_ERROR_EVENT_TYPE)?;
                map.serialize_entry("numberOfMetrics", number_of_metrics)?;
                map.serialize_entry("configuredLimit", configured_limit)?;
                map.end()
            }
        }
    }
}

/// The document delivered to the collector after each flush.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Payload {
    /// Fixed integration name.
    pub name: &'static str,
    /// Version of this integration.
    pub integration_version: &'static str,
    /// Fixed protocol version.
    pub protocol_version: &'static str,
    /// Event records in entity order, then event type order.
    pub metrics: Vec<EventRecord>,
    /// Always empty.
    pub inventory: IndexMap<String, serde_json::Value>,
    /// Always empty.
    pub events: Vec<serde_json::Value>,
}

impl Payload {
    /// Creates a payload without records.
    pub fn new() -> Self {
        Self {
            name: INTEGRATION_NAME,
            integration_version: env!("CARGO_PKG_VERSION"),
            protocol_version: PROTOCOL_VERSION,
            metrics: Vec::new(),
            inventory: IndexMap::new(),
            events: Vec::new(),
        }
    }

    /// Returns `true` if the payload carries no records and need not be delivered.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Serializes the payload to compact JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

/// Composes the payload for one flush cycle.
///
/// Every event whose field count exceeds `metrics_limit` is suppressed. With `send_limit_errors`
/// set, a [`EventRecord::LimitError`] takes its place.
pub fn compose(entities: &EntityMap, metrics_limit: usize, send_limit_errors: bool) -> Payload {
    let mut payload = Payload::new();

    for (key, record) in entities.iter() {
        for (event_type, fields) in &record.metrics {
            if fields.len() <= metrics_limit {
                payload.metrics.push(EventRecord::Sample {
                    event_type: event_type.clone(),
                    fields: fields.clone(),
                });
                continue;
            }

            metrelay_log::warn!(
                entity = key.as_str(),
                event_type = event_type.as_str(),
                number_of_metrics = fields.len(),
                configured_limit = metrics_limit,
                "event exceeds the metrics limit"
            );
            metric!(
                counter(TransformCounters::LimitExceeded) += 1,
                event_type = event_type.as_str(),
                reported = if send_limit_errors { "true" } else { "false" },
            );

            if send_limit_errors {
                payload.metrics.push(EventRecord::LimitError {
                    number_of_metrics: fields.len(),
                    configured_limit: metrics_limit,
                });
            }
        }
    }

    metric!(histogram(TransformHistograms::Records) = payload.metrics.len() as u64);
    payload
}
