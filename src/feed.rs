//! Live value feed, consumer side.
//!
//! `LiveValueCache` folds parameter subscription pushes into a snapshot of
//! the latest value per qualified name and publishes it on a watch channel.
//! Readers never mutate the cache.
//!
//! `Throttled` decouples update arrival from rendering: the producer
//! overwrites a latest-value cell on every push, and the consumer reads it at
//! most once per refresh tick, and only when it changed.

use mdb_types::{NamedObjectId, ParameterData, ParameterValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::client::Subscription;
use crate::config::StackConfig;

/// Latest value per qualified parameter name
pub type ParameterSnapshot = Arc<HashMap<String, ParameterValue>>;

#[derive(Debug)]
pub struct LiveValueCache {
    mapping: BTreeMap<u32, NamedObjectId>,
    tx: watch::Sender<ParameterSnapshot>,
}

impl Default for LiveValueCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveValueCache {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(HashMap::new()));
        Self {
            mapping: BTreeMap::new(),
            tx,
        }
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<ParameterSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        self.tx.borrow().clone()
    }

    /// Snapshot reader paced by the configured UI refresh interval
    pub fn throttled(&self, config: &StackConfig) -> Throttled<ParameterSnapshot> {
        Throttled::new(self.subscribe(), config.refresh_interval())
    }

    /// Apply one push: mapping first, then values, then invalidations.
    ///
    /// Values for numeric ids without a mapping are dropped.
    pub fn apply(&mut self, data: ParameterData) {
        if let Some(mapping) = data.mapping {
            self.mapping = mapping;
        }

        let mut next: Option<HashMap<String, ParameterValue>> = None;

        for value in data.values.unwrap_or_default() {
            let name = match (&value.id, value.numeric_id) {
                (Some(id), _) => Some(id.name.clone()),
                (None, Some(numeric)) => self.mapping.get(&numeric).map(|id| id.name.clone()),
                (None, None) => None,
            };
            match name {
                Some(name) => {
                    next.get_or_insert_with(|| self.tx.borrow().as_ref().clone())
                        .insert(name, value);
                }
                None => trace!("Dropping value for unmapped id {:?}", value.numeric_id),
            }
        }

        for numeric in data.invalid.unwrap_or_default() {
            if let Some(id) = self.mapping.remove(&numeric) {
                next.get_or_insert_with(|| self.tx.borrow().as_ref().clone())
                    .remove(&id.name);
            }
        }

        if let Some(values) = next {
            self.tx.send_replace(Arc::new(values));
        }
    }

    /// Apply pushes until the subscription ends
    pub async fn pump(&mut self, subscription: &mut Subscription<ParameterData>) {
        while let Some(data) = subscription.recv().await {
            self.apply(data);
        }
        debug!("Parameter subscription ended");
    }
}

/// Rate-limited reader of a latest-value cell
#[derive(Debug)]
pub struct Throttled<T> {
    rx: watch::Receiver<T>,
    ticks: Interval,
}

impl<T: Clone> Throttled<T> {
    pub fn new(rx: watch::Receiver<T>, period: Duration) -> Self {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { rx, ticks }
    }

    /// Wait for the next tick at which the cell changed and return its
    /// current value. `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            self.ticks.tick().await;
            match self.rx.has_changed() {
                Ok(true) => return Some(self.rx.borrow_and_update().clone()),
                Ok(false) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdb_types::Value;

    fn numeric(id: u32, value: Value) -> ParameterValue {
        ParameterValue {
            numeric_id: Some(id),
            ..ParameterValue::with_eng_value(value)
        }
    }

    #[test]
    fn values_resolve_through_mapping() {
        let mut cache = LiveValueCache::new();
        cache.apply(ParameterData {
            mapping: Some(BTreeMap::from([(1, NamedObjectId::qualified("/YSS/V"))])),
            values: Some(vec![numeric(1, Value::Double(3.3)), numeric(2, Value::Double(9.9))]),
            invalid: None,
        });
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["/YSS/V"].eng_value, Some(Value::Double(3.3)));
    }

    #[test]
    fn invalid_ids_are_dropped() {
        let mut cache = LiveValueCache::new();
        cache.apply(ParameterData {
            mapping: Some(BTreeMap::from([
                (1, NamedObjectId::qualified("/A")),
                (2, NamedObjectId::qualified("/B")),
            ])),
            values: Some(vec![numeric(1, Value::Uint32(1)), numeric(2, Value::Uint32(2))]),
            invalid: None,
        });
        cache.apply(ParameterData {
            invalid: Some(vec![1]),
            ..Default::default()
        });
        let snapshot = cache.snapshot();
        assert!(!snapshot.contains_key("/A"));
        assert!(snapshot.contains_key("/B"));
    }

    #[test]
    fn receivers_only_see_real_changes() {
        let mut cache = LiveValueCache::new();
        let mut rx = cache.subscribe();
        cache.apply(ParameterData::default());
        assert!(!rx.has_changed().unwrap());
        cache.apply(ParameterData {
            values: Some(vec![ParameterValue {
                id: Some(NamedObjectId::qualified("/X")),
                ..ParameterValue::with_eng_value(Value::Boolean(true))
            }]),
            ..Default::default()
        });
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().contains_key("/X"));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_yields_latest_once_per_tick() {
        let (tx, rx) = watch::channel(0u32);
        let mut throttled = Throttled::new(rx, Duration::from_millis(100));

        for n in 1..=50 {
            tx.send_replace(n);
        }
        assert_eq!(throttled.next().await, Some(50));

        tx.send_replace(51);
        tx.send_replace(52);
        assert_eq!(throttled.next().await, Some(52));

        drop(tx);
        assert_eq!(throttled.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_reader_follows_refresh_interval() {
        let mut cache = LiveValueCache::new();
        let config = StackConfig {
            refresh_interval_ms: 250,
            ..StackConfig::default()
        };
        let mut reader = cache.throttled(&config);
        let start = tokio::time::Instant::now();

        // The first tick fires immediately
        cache.apply(ParameterData {
            values: Some(vec![ParameterValue {
                id: Some(NamedObjectId::qualified("/YSS/A")),
                ..ParameterValue::with_eng_value(Value::Uint32(1))
            }]),
            ..Default::default()
        });
        let first = reader.next().await.unwrap();
        assert!(first.contains_key("/YSS/A"));

        cache.apply(ParameterData {
            values: Some(vec![ParameterValue {
                id: Some(NamedObjectId::qualified("/YSS/B")),
                ..ParameterValue::with_eng_value(Value::Uint32(2))
            }]),
            ..Default::default()
        });
        let second = reader.next().await.unwrap();
        assert!(second.contains_key("/YSS/B"));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_skips_idle_ticks() {
        let (tx, rx) = watch::channel("idle");
        let mut throttled = Throttled::new(rx, Duration::from_millis(100));
        let start = tokio::time::Instant::now();

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            tx.send_replace("busy");
            tokio::time::sleep(Duration::from_millis(1000)).await;
        });

        assert_eq!(throttled.next().await, Some("busy"));
        assert!(start.elapsed() >= Duration::from_millis(350));
        producer.abort();
    }
}
