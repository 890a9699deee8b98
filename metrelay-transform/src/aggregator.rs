use metrelay_statsd::metric;

use crate::entity::EntityMap;
use crate::rule::{Rule, RuleMatch};
use crate::snapshot::MetricSnapshot;
use crate::statsd::TransformCounters;
use crate::tags::{TaggedName, Tags};

/// Suffix of the metric derived from a counter's per-second rate.
pub const PER_SECOND_SUFFIX: &str = "PerSecond";

/// Result of running all rules over a snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregation {
    /// Records grouped by entity.
    pub entities: EntityMap,
    /// Number of metrics that matched at least one rule.
    pub matched: usize,
    /// Number of rule matches that were rejected by the rule's schema.
    pub invalid: usize,
}

/// Groups the metrics of a snapshot into entity records.
///
/// Categories are processed in a fixed order: counters, timers, gauges, then sets. Within each
/// category, every metric is evaluated against every rule in configuration order.
pub struct EntityAggregator<'a> {
    rules: &'a [Rule],
    debug: bool,
    state: Aggregation,
}

impl<'a> EntityAggregator<'a> {
    /// Creates an aggregator over the given rules.
    ///
    /// With `debug` set, rejected matches are logged at info level instead of debug.
    pub fn new(rules: &'a [Rule], debug: bool) -> Self {
        Self {
            rules,
            debug,
            state: Aggregation::default(),
        }
    }

    /// Evaluates all rules for all metrics in the snapshot.
    pub fn aggregate(mut self, snapshot: &MetricSnapshot) -> Aggregation {
        for (key, &value) in &snapshot.counters {
            let tagged = TaggedName::parse(key);
            let rate = snapshot.counter_rates.get(key).copied();
            self.aggregate_counter(&tagged, value, rate);
        }

        for (key, stats) in &snapshot.timer_data {
            let tagged = TaggedName::parse(key);
            for (stat, &value) in stats {
                let name = format!("{}.{stat}", tagged.name);
                self.aggregate_metric(&name, value, &tagged.tags);
            }
        }

        for (key, &value) in &snapshot.gauges {
            let tagged = TaggedName::parse(key);
            self.aggregate_metric(tagged.name, value, &tagged.tags);
        }

        for (key, members) in &snapshot.sets {
            let tagged = TaggedName::parse(key);
            let name = format!("{}.count", tagged.name);
            self.aggregate_metric(&name, members.len() as f64, &tagged.tags);
        }

        metric!(counter(TransformCounters::MetricsMatched) += self.state.matched as i64);
        self.state
    }

    /// Evaluates a counter and, for every rule it matches, its per-second rate.
    fn aggregate_counter(&mut self, tagged: &TaggedName<'_>, value: f64, rate: Option<f64>) {
        let rules = self.rules;
        let per_second = format!("{}{PER_SECOND_SUFFIX}", tagged.name);
        let mut matched = false;

        for rule in rules {
            if !self.evaluate(rule, tagged.name, value, &tagged.tags) {
                continue;
            }

            matched = true;
            if let Some(rate) = rate {
                self.evaluate(rule, &per_second, rate, &tagged.tags);
            }
        }

        self.count(matched);
    }

    fn aggregate_metric(&mut self, name: &str, value: f64, tags: &Tags) {
        let rules = self.rules;
        let mut matched = false;

        for rule in rules {
            matched |= self.evaluate(rule, name, value, tags);
        }

        self.count(matched);
    }

    /// Evaluates one rule and returns whether its expression matched.
    fn evaluate(&mut self, rule: &Rule, name: &str, value: f64, tags: &Tags) -> bool {
        match rule.evaluate(name, value, tags, &mut self.state.entities) {
            RuleMatch::NoMatch => false,
            RuleMatch::Matched { emitted: true } => true,
            RuleMatch::Matched { emitted: false } => {
                self.state.invalid += 1;
                self.log_invalid(rule, name);
                metric!(
                    counter(TransformCounters::SchemaInvalid) += 1,
                    event_type = rule.event_type()
                );
                true
            }
        }
    }

    fn log_invalid(&self, rule: &Rule, name: &str) {
        let schema = rule.config().metric_schema.as_str();
        if self.debug {
            metrelay_log::info!(metric = name, schema, "metric name does not fit rule schema");
        } else {
            metrelay_log::debug!(metric = name, schema, "metric name does not fit rule schema");
        }
    }

    fn count(&mut self, matched: bool) {
        if matched {
            self.state.matched += 1;
        }
    }
}

/// Runs all rules over a snapshot. See [`EntityAggregator`].
pub fn aggregate(rules: &[Rule], snapshot: &MetricSnapshot, debug: bool) -> Aggregation {
    EntityAggregator::new(rules, debug).aggregate(snapshot)
}
