//! The periodic flush loop.

use std::sync::Arc;
use std::time::Duration;

use metrelay_transform::{Deliver, Transform, UnixTimestamp};
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregator::SnapshotAggregator;
use crate::shutdown::ShutdownHandle;
use crate::status::SharedStatus;

/// Takes a snapshot of the aggregator every interval and runs it through the transform.
///
/// A final cycle runs when shutdown is triggered, so metrics received since the last tick are
/// still delivered.
pub struct FlushService<D> {
    transform: Transform,
    aggregator: Arc<Mutex<SnapshotAggregator>>,
    delivery: D,
    status: SharedStatus,
    interval: Duration,
}

impl<D: Deliver> FlushService<D> {
    /// Creates the flush service.
    pub fn new(
        transform: Transform,
        aggregator: Arc<Mutex<SnapshotAggregator>>,
        delivery: D,
        status: SharedStatus,
        interval: Duration,
    ) -> Self {
        Self {
            transform,
            aggregator,
            delivery,
            status,
            interval,
        }
    }

    /// Runs a single flush cycle.
    pub fn flush(&self) {
        let timestamp = UnixTimestamp::now();
        self.status.write().flush_started(timestamp);

        let snapshot = self.aggregator.lock().take_snapshot(self.interval);
        metrelay_log::trace!(%timestamp, metrics = snapshot.len(), "flushing snapshot");

        self.transform.flush(timestamp, &snapshot, &self.delivery);
    }

    /// Runs flush cycles until shutdown and returns the delivery for draining.
    pub async fn run(self, mut shutdown: ShutdownHandle) -> D {
        metrelay_log::info!(
            interval = self.interval.as_secs(),
            "flushing metrics every {}s",
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                _ = ticker.tick() => self.flush(),
            }
        }

        metrelay_log::info!("running final flush");
        self.flush();

        self.delivery
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use parking_lot::RwLock;
    use serde_json::{Value, json};

    use super::*;
    use crate::protocol::StatsdLine;
    use crate::shutdown::Shutdown;
    use crate::status::FlushStatus;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Vec<u8>>>);

    impl Deliver for Recorder {
        fn deliver(&self, body: Vec<u8>) {
            self.0.borrow_mut().push(body);
        }
    }

    fn service() -> FlushService<Recorder> {
        let config = serde_json::from_value(json!({
            "rules": [{
                "matchExpression": "redis",
                "metricSchema": "{app}.{service}.{metricName}",
                "entityType": "Redis",
                "entityName": "{app}",
                "eventType": "RedisSample"
            }]
        }))
        .unwrap();

        FlushService::new(
            Transform::new(config),
            Arc::new(Mutex::new(SnapshotAggregator::new(vec![], false))),
            Recorder::default(),
            Arc::new(RwLock::new(FlushStatus::default())),
            Duration::from_secs(10),
        )
    }

    fn insert(service: &FlushService<Recorder>, data: &[u8]) {
        let mut aggregator = service.aggregator.lock();
        for line in StatsdLine::parse_all(data) {
            aggregator.insert(line.unwrap());
        }
    }

    #[test]
    fn test_flush_delivers_and_records_status() {
        metrelay_log::init_test!();

        let service = service();
        insert(&service, b"myapp.redis.hits:20|c");
        service.flush();

        let bodies = service.delivery.0.borrow();
        assert_eq!(bodies.len(), 1);

        let payload: Value = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(
            payload["metrics"],
            json!([{
                "event_type": "RedisSample",
                "app": "myapp",
                "service": "redis",
                "hits": 20,
                "hitsPerSecond": 2
            }])
        );
        assert!(service.status.read().last_flush.is_some());
    }

    #[test]
    fn test_empty_interval_not_delivered() {
        metrelay_log::init_test!();

        let service = service();
        service.flush();

        assert!(service.delivery.0.borrow().is_empty());
        assert!(service.status.read().last_flush.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_flush_on_shutdown() {
        metrelay_log::init_test!();

        let service = service();
        insert(&service, b"myapp.redis.used_memory:1024|g");

        let shutdown = Shutdown::new();
        shutdown.trigger();

        let delivery = service.run(shutdown.handle()).await;
        assert_eq!(delivery.0.into_inner().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_flush_every_interval() {
        metrelay_log::init_test!();

        let service = service();
        insert(&service, b"myapp.redis.used_memory:1|g");

        let shutdown = Shutdown::new();
        let handle = shutdown.handle();

        let stop = async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            shutdown.trigger();
        };

        let (delivery, ()) = tokio::join!(service.run(handle), stop);
        // ticks at 10s and 20s plus the final flush, gauges are reported every time
        assert_eq!(delivery.0.into_inner().len(), 3);
    }
}
