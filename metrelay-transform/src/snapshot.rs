use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Statistics computed for a single timer, keyed by statistic name (`sum`, `mean`, ...).
pub type TimerStats = IndexMap<String, f64>;

/// A flat snapshot of aggregated metrics for one flush cycle.
///
/// Keys are raw metric keys and may carry tags after a `#` separator, see
/// [`TaggedName`](crate::TaggedName). Every category is optional when deserializing.
///
/// ```
/// use metrelay_transform::MetricSnapshot;
///
/// let snapshot: MetricSnapshot = serde_json::from_str(r#"{
///     "gauges": {"myapp.redis.my_gauge": 1},
///     "timer_data": {"myapp.redis.my_timer": {"sum": 10, "mean": 10}}
/// }"#).unwrap();
///
/// assert_eq!(snapshot.gauges["myapp.redis.my_gauge"], 1.0);
/// assert!(snapshot.counters.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricSnapshot {
    /// Counter totals accumulated over the flush interval.
    pub counters: IndexMap<String, f64>,
    /// Counter totals divided by the flush interval in seconds.
    pub counter_rates: IndexMap<String, f64>,
    /// Last known gauge values.
    pub gauges: IndexMap<String, f64>,
    /// Statistics for timers.
    pub timer_data: IndexMap<String, TimerStats>,
    /// Unique members observed per set.
    pub sets: IndexMap<String, BTreeSet<String>>,
}

impl MetricSnapshot {
    /// Returns `true` if the snapshot contains no metrics in any category.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.counter_rates.is_empty()
            && self.gauges.is_empty()
            && self.timer_data.is_empty()
            && self.sets.is_empty()
    }

    /// Returns the total number of metric keys across all categories except counter rates.
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.timer_data.len() + self.sets.len()
    }
}
