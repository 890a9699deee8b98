use metrelay_statsd::{CounterMetric, HistogramMetric, TimerMetric};

/// Counter metrics used by the server.
pub enum ServerCounters {
    /// Number of payloads posted to the upstream.
    ///
    /// This metric is tagged with:
    /// - `result`: `success` or `failure`.
    UpstreamRequests,
    /// Number of failed payload deliveries.
    ///
    /// This metric is tagged with:
    /// - `kind`: `network` if the request did not complete, `status` for a non-success response.
    UpstreamErrors,
    /// Number of datagrams received on the statsd socket.
    IngestPackets,
    /// Number of statsd lines that could not be parsed.
    IngestInvalidLines,
}

impl CounterMetric for ServerCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::UpstreamRequests => "upstream.requests",
            Self::UpstreamErrors => "upstream.errors",
            Self::IngestPackets => "ingest.packets",
            Self::IngestInvalidLines => "ingest.lines.invalid",
        }
    }
}

/// Histogram metrics used by the server.
pub enum ServerHistograms {
    /// Size of delivered payload bodies in bytes.
    UpstreamPayloadBytes,
}

impl HistogramMetric for ServerHistograms {
    fn name(&self) -> &'static str {
        match self {
            Self::UpstreamPayloadBytes => "upstream.payload_bytes",
        }
    }
}

/// Timer metrics used by the server.
pub enum ServerTimers {
    /// Round-trip time of payload deliveries.
    ///
    /// This metric is tagged with:
    /// - `result`: `success` or `failure`.
    UpstreamDuration,
}

impl TimerMetric for ServerTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::UpstreamDuration => "upstream.duration",
        }
    }
}
