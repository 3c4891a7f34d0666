//! Keyed value table shared with the robot's control software
//!
//! Stands in for the telemetry link: the localizer publishes into it and
//! switched streams subscribe to selector keys on it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::trace;

/// Typed table value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DoubleArray(Vec<f64>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Destination for localization estimates. Fire-and-forget.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, channel: &str, value: [f64; 2]);
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    updated_at: DateTime<Utc>,
}

/// In-process value table with per-key change subscriptions
#[derive(Default)]
pub struct ValueTable {
    entries: RwLock<HashMap<String, Entry>>,
    listeners: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and deliver it to every subscriber of `key`
    pub fn set(&self, key: &str, value: Value) {
        trace!("{} = {:?}", key, value);

        // Store and deliver under the listener lock so subscribers observe
        // sets in the same order as the table
        let mut listeners = self.listeners.write();
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                updated_at: Utc::now(),
            },
        );

        if let Some(senders) = listeners.get_mut(key) {
            // Drop subscribers whose receiver has gone away
            senders.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).map(|e| e.value.clone())
    }

    /// When `key` was last set
    pub fn updated_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.read().get(key).map(|e| e.updated_at)
    }

    /// Subscribe to `key`. The current value, if any, is delivered
    /// immediately, followed by every later `set`.
    pub fn subscribe(&self, key: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Hold the listener lock across the snapshot so no set slips in between
        let mut listeners = self.listeners.write();
        if let Some(current) = self.get(key) {
            let _ = tx.send(current);
        }
        listeners.entry(key.to_string()).or_default().push(tx);

        rx
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl TelemetrySink for ValueTable {
    fn publish(&self, channel: &str, value: [f64; 2]) {
        self.set(channel, Value::DoubleArray(value.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let table = ValueTable::new();
        assert!(table.get("a").is_none());
        table.set("a", Value::from(3_i64));
        assert_eq!(table.get("a"), Some(Value::Integer(3)));
        assert!(table.updated_at("a").is_some());
        assert_eq!(table.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_subscribe_delivers_current_value_first() {
        let table = ValueTable::new();
        table.set("/camera/select", Value::from("front"));

        let mut rx = table.subscribe("/camera/select");
        assert_eq!(rx.try_recv().unwrap(), Value::String("front".into()));
        assert!(rx.try_recv().is_err());

        table.set("/camera/select", Value::from(2_i64));
        assert_eq!(rx.try_recv().unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_subscribe_without_value() {
        let table = ValueTable::new();
        let mut rx = table.subscribe("k");
        assert!(rx.try_recv().is_err());
        table.set("k", Value::Boolean(true));
        assert_eq!(rx.try_recv().unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_subscriber_wakes_on_set() {
        let table = ValueTable::new();
        let mut rx = table.subscribe("k");
        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());

        table.set("k", Value::Integer(7));
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(Value::Integer(7)));
    }

    #[test]
    fn test_fan_out_and_isolation() {
        let table = ValueTable::new();
        let mut a = table.subscribe("k");
        let mut b = table.subscribe("k");
        let mut other = table.subscribe("other");

        table.set("k", Value::Double(1.5));
        assert_eq!(a.try_recv().unwrap(), Value::Double(1.5));
        assert_eq!(b.try_recv().unwrap(), Value::Double(1.5));
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_sets_deliver_stored_value_last() {
        let table = ValueTable::new();
        let mut rx = table.subscribe("/camera/select");

        std::thread::scope(|scope| {
            for t in 0..8_i64 {
                let table = &table;
                scope.spawn(move || {
                    for i in 0..500 {
                        table.set("/camera/select", Value::Integer(t * 1000 + i));
                    }
                });
            }
        });

        let mut last = None;
        let mut delivered = 0;
        while let Ok(value) = rx.try_recv() {
            last = Some(value);
            delivered += 1;
        }
        assert_eq!(delivered, 8 * 500);
        assert_eq!(last, table.get("/camera/select"));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let table = ValueTable::new();
        let rx = table.subscribe("k");
        drop(rx);
        table.set("k", Value::Integer(1));
        assert!(table.listeners.read().get("k").unwrap().is_empty());
    }

    #[test]
    fn test_publish_as_double_array() {
        let table = ValueTable::new();
        table.publish("Camera/NotePose", [1.25, -0.5]);
        assert_eq!(table.get("Camera/NotePose"), Some(Value::DoubleArray(vec![1.25, -0.5])));
    }
}
