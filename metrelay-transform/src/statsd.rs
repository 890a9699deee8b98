use metrelay_statsd::{CounterMetric, HistogramMetric, TimerMetric};

/// Counter metrics for the transform.
pub enum TransformCounters {
    /// Incremented by the number of metrics that matched at least one rule in a flush cycle.
    ///
    /// Derived `PerSecond` counter metrics are not counted.
    MetricsMatched,

    /// Incremented for every rule match whose metric name is shorter than the rule's schema.
    ///
    /// Tagged by `event_type`.
    SchemaInvalid,

    /// Incremented for every event that exceeded the configured field limit.
    ///
    /// Tagged by `event_type` and by whether a limit error record was sent in its place.
    LimitExceeded,
}

impl CounterMetric for TransformCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::MetricsMatched => "transform.metrics.matched",
            Self::SchemaInvalid => "transform.schema.invalid",
            Self::LimitExceeded => "transform.limit.exceeded",
        }
    }
}

/// Histogram metrics for the transform.
pub enum TransformHistograms {
    /// The number of event records in a composed payload, including limit error records.
    Records,
}

impl HistogramMetric for TransformHistograms {
    fn name(&self) -> &'static str {
        match *self {
            Self::Records => "transform.records",
        }
    }
}

/// Timer metrics for the transform.
pub enum TransformTimers {
    /// Time spent aggregating and composing a payload in one flush cycle.
    ///
    /// Delivery is not part of this timer.
    FlushDuration,
}

impl TimerMetric for TransformTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::FlushDuration => "flush.duration",
        }
    }
}
