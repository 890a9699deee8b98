use std::cell::RefCell;

use metrelay_transform::{
    Deliver, LIMIT_ERROR_EVENT_TYPE, MetricSnapshot, Payload, Transform, TransformConfig,
    UnixTimestamp,
};
use serde_json::{Value, json};
use similar_asserts::assert_eq;

#[derive(Default)]
struct Recorder(RefCell<Vec<Vec<u8>>>);

impl Deliver for Recorder {
    fn deliver(&self, body: Vec<u8>) {
        self.0.borrow_mut().push(body);
    }
}

impl Recorder {
    fn bodies(&self) -> Vec<Value> {
        self.0
            .borrow()
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }
}

fn redis_rule() -> Value {
    json!({
        "matchExpression": ".*redis.*",
        "metricSchema": "{app}.{service}.{metricName}",
        "entityType": "Redis Cluster",
        "entityName": "Production Host1",
        "eventType": "RedisSample"
    })
}

fn transform(config: Value) -> Transform {
    Transform::new(serde_json::from_value::<TransformConfig>(config).unwrap())
}

fn snapshot(json: &str) -> MetricSnapshot {
    serde_json::from_str(json).unwrap()
}

fn flush(transform: &Transform, snapshot: &MetricSnapshot) -> (Payload, Recorder) {
    let recorder = Recorder::default();
    let payload = transform.flush(UnixTimestamp::from_secs(1_700_000_000), snapshot, &recorder);
    (payload, recorder)
}

fn records(payload: &Payload) -> Value {
    serde_json::to_value(&payload.metrics).unwrap()
}

#[test]
fn test_end_to_end() {
    metrelay_log::init_test!();

    let transform = transform(json!({ "rules": [redis_rule()] }));
    let snapshot = snapshot(
        r#"{
            "gauges": {"myapp.redis.my_gauge": 1},
            "counters": {"myapp.redis.my_counter": 10},
            "counter_rates": {"myapp.redis.my_counter": 1},
            "timer_data": {"myapp.redis.my_timer": {"sum": 10, "mean": 10}}
        }"#,
    );

    let (payload, recorder) = flush(&transform, &snapshot);

    assert_eq!(
        records(&payload),
        json!([{
            "event_type": "RedisSample",
            "app": "myapp",
            "service": "redis",
            "my_gauge": 1,
            "my_counter": 10,
            "my_counterPerSecond": 1,
            "my_timer.sum": 10,
            "my_timer.mean": 10
        }])
    );

    let bodies = recorder.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0], serde_json::to_value(&payload).unwrap());

    insta::assert_json_snapshot!(payload, {
        ".integration_version" => "[version]",
    }, @r###"
    {
      "name": "com.newrelic.statsd",
      "integration_version": "[version]",
      "protocol_version": "1",
      "metrics": [
        {
          "event_type": "RedisSample",
          "app": "myapp",
          "service": "redis",
          "my_counter": 10,
          "my_counterPerSecond": 1,
          "my_timer.sum": 10,
          "my_timer.mean": 10,
          "my_gauge": 1
        }
      ],
      "inventory": {},
      "events": []
    }
    "###);
}

#[test]
fn test_no_match_no_delivery() {
    let transform = transform(json!({ "rules": [redis_rule()] }));
    let snapshot = snapshot(
        r#"{
            "gauges": {"myapp.mysql.connections": 12},
            "counters": {"myapp.mysql.queries": 100},
            "sets": {"myapp.mysql.users": ["a", "b"]}
        }"#,
    );

    let (payload, recorder) = flush(&transform, &snapshot);

    assert!(payload.metrics.is_empty());
    assert!(recorder.bodies().is_empty());
}

#[test]
fn test_schema_segment_count() {
    let transform = transform(json!({ "rules": [redis_rule()] }));

    let (accepted, _) = flush(&transform, &snapshot(r#"{"gauges": {"myapp.redis.my_gauge": 1}}"#));
    assert_eq!(accepted.metrics.len(), 1);

    let (rejected, recorder) = flush(&transform, &snapshot(r#"{"gauges": {"redis.my_gauge": 1}}"#));
    assert!(rejected.metrics.is_empty());
    assert!(recorder.bodies().is_empty());
}

#[test]
fn test_idempotent_flush() {
    let transform = transform(json!({ "rules": [redis_rule()] }));
    let snapshot = snapshot(
        r#"{
            "gauges": {"b.redis.g": 1, "a.redis.g#t:v": 2},
            "counters": {"a.redis.c": 3, "b.redis.c": 4},
            "counter_rates": {"a.redis.c": 0.3, "b.redis.c": 0.4},
            "timer_data": {"a.redis.t": {"count": 1, "sum": 2, "mean": 2}},
            "sets": {"a.redis.s": ["x"]}
        }"#,
    );

    let first = Recorder::default();
    let second = Recorder::default();
    transform.flush(UnixTimestamp::from_secs(1), &snapshot, &first);
    transform.flush(UnixTimestamp::from_secs(2), &snapshot, &second);

    assert_eq!(first.0.into_inner(), second.0.into_inner());
}

#[test]
fn test_overflow_law() {
    let transform = transform(json!({
        "rules": [redis_rule()],
        "metrics_limit": 3
    }));
    let snapshot = snapshot(
        r#"{"gauges": {"myapp.redis.a": 1, "myapp.redis.b": 2, "myapp.redis.c": 3}}"#,
    );

    let (payload, _) = flush(&transform, &snapshot);

    // app, service, a, b and c
    assert_eq!(
        records(&payload),
        json!([{
            "event_type": LIMIT_ERROR_EVENT_TYPE,
            "numberOfMetrics": 5,
            "configuredLimit": 3
        }])
    );
}

#[test]
fn test_overflow_dropped_without_limit_errors() {
    let transform = transform(json!({
        "rules": [redis_rule()],
        "metricsLimit": 3,
        "sendLimitErrors": false
    }));
    let snapshot = snapshot(
        r#"{"gauges": {"myapp.redis.a": 1, "myapp.redis.b": 2, "myapp.redis.c": 3}}"#,
    );

    let (payload, recorder) = flush(&transform, &snapshot);

    assert!(payload.metrics.is_empty());
    assert!(recorder.bodies().is_empty());
}

#[test]
fn test_tag_law() {
    let transform = transform(json!({
        "rules": [{
            "matchExpression": "my_counter",
            "metricSchema": "{metricName}",
            "entityType": "Redis Cluster",
            "entityName": "Production Host1",
            "eventType": "RedisSample"
        }]
    }));
    let snapshot = snapshot(r#"{"counters": {"my_counter#t1:v1": 5, "my_counter": 10}}"#);

    let (payload, _) = flush(&transform, &snapshot);

    assert_eq!(
        records(&payload),
        json!([
            {"event_type": "RedisSample", "my_counter": 5, "label.t1": "v1"},
            {"event_type": "RedisSample", "my_counter": 10}
        ])
    );
}

#[test]
fn test_counter_rate_law() {
    let transform = transform(json!({ "rules": [redis_rule()] }));
    let snapshot = snapshot(
        r#"{
            "counters": {"myapp.redis.my_counter": 20},
            "counter_rates": {"myapp.redis.my_counter": 2}
        }"#,
    );

    let (payload, _) = flush(&transform, &snapshot);
    let records = records(&payload);

    assert_eq!(records[0]["my_counter"], 20);
    assert_eq!(records[0]["my_counterPerSecond"], 2);
}

#[test]
fn test_later_rule_wins_on_collision() {
    let transform = transform(json!({
        "rules": [
            {
                "matchExpression": "redis",
                "metricSchema": "{app}.{service}.{metricName}",
                "entityType": "Redis",
                "entityName": "main",
                "eventType": "RedisSample",
                "labels": {"tier": "first"}
            },
            {
                "matchExpression": "redis",
                "metricSchema": "{app}.{metricName}",
                "entityType": "Redis",
                "entityName": "main",
                "eventType": "RedisSample",
                "labels": {"tier": "second"}
            }
        ]
    }));
    let snapshot = snapshot(r#"{"gauges": {"myapp.redis.hits": 7}}"#);

    let (payload, _) = flush(&transform, &snapshot);

    assert_eq!(
        records(&payload),
        json!([{
            "event_type": "RedisSample",
            "app": "myapp",
            "service": "redis",
            "hits": 7,
            "label.tier": "second",
            "redis.hits": 7
        }])
    );
}

#[test]
fn test_unresolved_entity_template() {
    let transform = transform(json!({
        "rules": [{
            "matchExpression": "redis",
            "metricSchema": "{app}.{service}.{metricName}",
            "entityType": "Redis",
            "entityName": "{host}",
            "eventType": "RedisSample",
            "labels": {"host": "{host}"}
        }]
    }));
    let snapshot = snapshot(r#"{"gauges": {"myapp.redis.hits": 7}}"#);

    let (payload, _) = flush(&transform, &snapshot);
    assert_eq!(records(&payload)[0]["label.host"], "undefined");
}

#[test]
fn test_sets_report_cardinality() {
    let transform = transform(json!({ "rules": [redis_rule()] }));
    let snapshot = snapshot(r#"{"sets": {"myapp.redis.clients": ["a", "b", "c"]}}"#);

    let (payload, _) = flush(&transform, &snapshot);
    assert_eq!(records(&payload)[0]["clients.count"], 3);
}
