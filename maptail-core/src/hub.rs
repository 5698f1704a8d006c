//! Bounded history plus live fan-out
//!
//! Publishing and subscribing are serialized against each other, so a new
//! subscriber sees every event exactly once: either in its replay snapshot
//! or on its live queue, never both and never neither.
//!
//! Lock order: geo history, then log history, then the registry.

use crate::config::StreamConfig;
use crate::error::Result;
use crate::event::{Event, GeoRecord};
use crate::history::HistoryBuffer;
use crate::registry::{BroadcastReport, SubscriberId, SubscriberRegistry};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::trace;

pub struct Hub {
    geo_history: Mutex<HistoryBuffer<Event>>,
    log_history: Mutex<HistoryBuffer<Event>>,
    registry: Arc<SubscriberRegistry>,
    replay_logs: bool,
}

impl Hub {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            geo_history: Mutex::new(HistoryBuffer::new(config.geo_history)),
            log_history: Mutex::new(HistoryBuffer::new(config.log_history)),
            registry: Arc::new(SubscriberRegistry::new(config.subscriber_queue)),
            replay_logs: config.replay_logs,
        }
    }

    /// Stores a resolved record and sends it to every live subscriber
    pub fn publish_geo(&self, record: &GeoRecord) -> Result<BroadcastReport> {
        let event = Event::geo(record)?;
        let mut history = lock(&self.geo_history);
        history.push(event.clone());
        let report = self.registry.broadcast(&event);
        trace!("Published geo event for {}: {:?}", record.address, report);
        Ok(report)
    }

    /// Stores a raw line and sends it to every live subscriber
    pub fn publish_log(&self, line: &str) -> BroadcastReport {
        let event = Event::log(line);
        let mut history = lock(&self.log_history);
        history.push(event.clone());
        self.registry.broadcast(&event)
    }

    /// Registers a new viewer.
    ///
    /// The returned subscription carries the replay backlog: retained geo
    /// events oldest first, then retained log events if log replay is on.
    pub fn subscribe(&self) -> Subscription {
        let geo = lock(&self.geo_history);
        let logs = lock(&self.log_history);

        let mut replay = geo.snapshot();
        if self.replay_logs {
            replay.extend(logs.iter().cloned());
        }
        let (id, receiver) = self.registry.register();

        Subscription {
            id,
            replay,
            receiver,
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Retained geo events, oldest first
    pub fn geo_snapshot(&self) -> Vec<Event> {
        lock(&self.geo_history).snapshot()
    }

    /// Retained raw line events, oldest first
    pub fn log_snapshot(&self) -> Vec<Event> {
        lock(&self.log_history).snapshot()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A live viewer. Dropping it unregisters the subscriber.
pub struct Subscription {
    id: SubscriberId,
    replay: Vec<Event>,
    receiver: mpsc::Receiver<Event>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Takes the replay backlog; later calls return an empty list
    pub fn take_replay(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.replay)
    }

    /// Next live event, `None` once the subscriber has been removed
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
