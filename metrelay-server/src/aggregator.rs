use std::collections::BTreeSet;
use std::time::Duration;

use indexmap::IndexMap;
use metrelay_transform::{MetricSnapshot, TimerStats};

use crate::protocol::{MetricValue, StatsdLine};

/// Samples collected for a single timer.
#[derive(Clone, Debug, Default)]
struct TimerSamples {
    values: Vec<f64>,
    /// Number of samples weighted by their sample rate.
    count: f64,
}

/// Accumulates parsed statsd lines into per-interval aggregates.
///
/// Counters, timers and sets are reset by [`take_snapshot`](Self::take_snapshot). Gauges keep
/// their last value across intervals unless `delete_gauges` is set.
#[derive(Debug)]
pub struct SnapshotAggregator {
    percent_thresholds: Vec<f64>,
    delete_gauges: bool,
    counters: IndexMap<String, f64>,
    gauges: IndexMap<String, f64>,
    timers: IndexMap<String, TimerSamples>,
    sets: IndexMap<String, BTreeSet<String>>,
}

impl SnapshotAggregator {
    /// Creates an empty aggregator.
    pub fn new(percent_thresholds: Vec<f64>, delete_gauges: bool) -> Self {
        Self {
            percent_thresholds,
            delete_gauges,
            counters: IndexMap::new(),
            gauges: IndexMap::new(),
            timers: IndexMap::new(),
            sets: IndexMap::new(),
        }
    }

    /// Returns `true` if no metric has been recorded since the last snapshot.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.gauges.is_empty()
            && self.timers.is_empty()
            && self.sets.is_empty()
    }

    /// Records a single statsd line.
    pub fn insert(&mut self, line: StatsdLine) {
        let StatsdLine {
            key,
            value,
            sample_rate,
        } = line;

        match value {
            MetricValue::Counter(value) => {
                *self.counters.entry(key).or_default() += value / sample_rate;
            }
            MetricValue::Gauge(value) => {
                self.gauges.insert(key, value);
            }
            MetricValue::GaugeDelta(delta) => {
                *self.gauges.entry(key).or_default() += delta;
            }
            MetricValue::Timer(value) => {
                let samples = self.timers.entry(key).or_default();
                samples.values.push(value);
                samples.count += 1.0 / sample_rate;
            }
            MetricValue::Set(member) => {
                self.sets.entry(key).or_default().insert(member);
            }
        }
    }

    /// Produces the snapshot for an interval of the given length and resets the interval state.
    pub fn take_snapshot(&mut self, interval: Duration) -> MetricSnapshot {
        let seconds = interval.as_secs_f64();

        let counters = std::mem::take(&mut self.counters);
        let counter_rates = counters
            .iter()
            .map(|(key, value)| (key.clone(), value / seconds))
            .collect();

        let timer_data = std::mem::take(&mut self.timers)
            .into_iter()
            .map(|(key, samples)| (key, self.timer_stats(samples, seconds)))
            .collect();

        let gauges = if self.delete_gauges {
            std::mem::take(&mut self.gauges)
        } else {
            self.gauges.clone()
        };

        MetricSnapshot {
            counters,
            counter_rates,
            gauges,
            timer_data,
            sets: std::mem::take(&mut self.sets),
        }
    }

    fn timer_stats(&self, samples: TimerSamples, seconds: f64) -> TimerStats {
        let TimerSamples { mut values, count } = samples;
        values.sort_by(f64::total_cmp);

        let mut stats = TimerStats::new();
        if values.is_empty() {
            return stats;
        }

        let len = values.len();
        let cumulative: Vec<f64> = values
            .iter()
            .scan(0.0, |sum, value| {
                *sum += value;
                Some(*sum)
            })
            .collect();

        for &pct in &self.percent_thresholds {
            if pct <= 0.0 {
                continue;
            }

            let within = ((pct / 100.0) * len as f64).round() as usize;
            if within == 0 {
                continue;
            }
            let within = within.min(len);

            let suffix = pct.to_string().replace('.', "_");
            let sum = cumulative[within - 1];
            stats.insert(format!("count_{suffix}"), within as f64);
            stats.insert(format!("mean_{suffix}"), sum / within as f64);
            stats.insert(format!("upper_{suffix}"), values[within - 1]);
            stats.insert(format!("sum_{suffix}"), sum);
        }

        let sum = cumulative[len - 1];
        let mean = sum / len as f64;
        let variance = values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / len as f64;
        let median = if len % 2 == 0 {
            (values[len / 2 - 1] + values[len / 2]) / 2.0
        } else {
            values[len / 2]
        };

        stats.insert("std".to_owned(), variance.sqrt());
        stats.insert("upper".to_owned(), values[len - 1]);
        stats.insert("lower".to_owned(), values[0]);
        stats.insert("count".to_owned(), count);
        stats.insert("count_ps".to_owned(), count / seconds);
        stats.insert("sum".to_owned(), sum);
        stats.insert(
            "sum_squares".to_owned(),
            values.iter().map(|value| value * value).sum(),
        );
        stats.insert("mean".to_owned(), mean);
        stats.insert("median".to_owned(), median);

        stats
    }
}
