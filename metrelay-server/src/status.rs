use std::sync::Arc;

use metrelay_transform::UnixTimestamp;
use parking_lot::RwLock;
use serde::Serialize;

/// Outcome of the most recent flush cycles.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FlushStatus {
    /// Start of the most recent flush cycle.
    pub last_flush: Option<UnixTimestamp>,
    /// Time of the most recent delivery failure.
    pub last_exception: Option<UnixTimestamp>,
    /// Round-trip time of the most recent successful delivery in milliseconds.
    pub flush_time: u64,
    /// Size of the most recently delivered body in bytes.
    pub flush_length: usize,
    /// Description of the most recent delivery failure.
    pub last_error: Option<String>,
}

impl FlushStatus {
    /// Records the start of a flush cycle.
    pub fn flush_started(&mut self, timestamp: UnixTimestamp) {
        self.last_flush = Some(timestamp);
    }

    /// Records a successful delivery.
    pub fn delivered(&mut self, flush_time: u64, flush_length: usize) {
        self.flush_time = flush_time;
        self.flush_length = flush_length;
    }

    /// Records a failed delivery.
    pub fn failed(&mut self, timestamp: UnixTimestamp, error: String) {
        self.last_exception = Some(timestamp);
        self.last_error = Some(error);
    }
}

/// Flush status shared between the flush loop, deliveries and the status endpoint.
pub type SharedStatus = Arc<RwLock<FlushStatus>>;
