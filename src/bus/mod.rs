//! # Measurement Bus
//!
//! Topic-keyed publish/subscribe relay with last-value semantics.
//!
//! This module handles:
//! - Decoupling producers (drivers) from consumers (recorder, dashboard)
//! - Overwrite delivery: at most one in-flight value per topic
//! - No buffering or replay: a subscriber that joins after a publish does
//!   not see it
//!
//! Each topic is backed by a `tokio::sync::watch` channel, which gives
//! exactly the required semantics: `send_replace` overwrites the in-flight
//! value, and a freshly subscribed receiver has the current value marked as
//! seen so `changed()` only fires for publishes made after subscription.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::warn;

use crate::error::{Result, RowlogError};

/// Publish/subscribe relay keyed by string topic (`"<deviceType>/<metric>"`).
#[derive(Debug, Default)]
pub struct MeasurementBus {
    topics: Mutex<HashMap<String, watch::Sender<f64>>>,
}

impl MeasurementBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the latest value for a topic.
    ///
    /// Fire-and-forget: delivery overwrites any value a subscriber has not
    /// yet consumed, and publishing with no subscribers is not an error.
    pub fn publish(&self, topic: &str, value: f64) {
        let mut topics = match self.topics.lock() {
            Ok(topics) => topics,
            Err(e) => {
                warn!("dropping publish on {}: bus registry poisoned: {}", topic, e);
                return;
            }
        };

        topics
            .entry(topic.to_string())
            .or_insert_with(|| watch::channel(0.0).0)
            .send_replace(value);
    }

    /// Subscribe to a topic.
    ///
    /// The returned receiver only observes publishes made after this call.
    ///
    /// # Errors
    ///
    /// Returns `RowlogError::Subscribe` if the topic registry is unusable;
    /// callers are expected to log and continue without the topic.
    pub fn subscribe(&self, topic: &str) -> Result<watch::Receiver<f64>> {
        let mut topics = self
            .topics
            .lock()
            .map_err(|e| RowlogError::Subscribe(format!("bus registry poisoned: {}", e)))?;

        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| watch::channel(0.0).0);

        Ok(sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_sees_publish_after_join() {
        let bus = MeasurementBus::new();
        let mut rx = bus.subscribe("s4/power").unwrap();

        bus.publish("s4/power", 100.0);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 100.0);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_late_subscriber_does_not_replay() {
        let bus = MeasurementBus::new();
        bus.publish("s4/distance", 50.0);

        let rx = bus.subscribe("s4/distance").unwrap();
        // The value published before subscription is already marked seen.
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_overwrite_not_queue() {
        let bus = MeasurementBus::new();
        let mut rx = bus.subscribe("s4/speed").unwrap();

        bus.publish("s4/speed", 1.0);
        bus.publish("s4/speed", 2.0);
        bus.publish("s4/speed", 2.5);

        // Only the latest value is in flight.
        assert_eq!(*rx.borrow_and_update(), 2.5);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_every_current_subscriber_is_delivered() {
        let bus = MeasurementBus::new();
        let mut rx_a = bus.subscribe("s4/cadence").unwrap();
        let mut rx_b = bus.subscribe("s4/cadence").unwrap();

        bus.publish("s4/cadence", 24.5);

        assert_eq!(*rx_a.borrow_and_update(), 24.5);
        assert_eq!(*rx_b.borrow_and_update(), 24.5);
    }

    #[test]
    fn test_topics_are_independent() {
        let bus = MeasurementBus::new();
        let rx_power = bus.subscribe("s4/power").unwrap();
        let mut rx_dist = bus.subscribe("s4/distance").unwrap();

        bus.publish("s4/distance", 10.0);

        assert!(!rx_power.has_changed().unwrap());
        assert_eq!(*rx_dist.borrow_and_update(), 10.0);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = MeasurementBus::new();
        // Must not panic or error.
        bus.publish("hrm/heart_rate", 130.0);
    }
}
