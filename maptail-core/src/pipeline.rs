//! Line ingestion: forward, extract, resolve and publish
//!
//! `on_line` never blocks on geo lookups. Each extracted address gets its own
//! blocking task so one slow or failing lookup cannot hold up the others or
//! the next line. Geo events may therefore be published out of line order.

use crate::event::GeoRecord;
use crate::extract::{extract, Address};
use crate::geo::GeoResolver;
use crate::hub::Hub;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

/// Where a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    /// Our own formatted log output
    SelfLog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedLine {
    pub source: InputSource,
    pub text: String,
}

impl SourcedLine {
    pub fn new(source: InputSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }
}

/// What `on_line` did with a line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineOutcome {
    /// Whether the raw line was published as a log event
    pub forwarded: bool,
    /// Every address found, in discovery order
    pub addresses: Vec<Address>,
    /// Lookups started
    pub scheduled: usize,
    /// Addresses skipped because too many lookups were in flight
    pub shed: usize,
}

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub lines: u64,
    pub addresses: u64,
    pub resolved: u64,
    pub misses: u64,
    pub failures: u64,
    pub shed: u64,
}

#[derive(Default)]
struct Counters {
    lines: AtomicU64,
    addresses: AtomicU64,
    resolved: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    shed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

pub struct Pipeline {
    hub: Arc<Hub>,
    resolver: Arc<dyn GeoResolver>,
    forward_logs: bool,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl Pipeline {
    pub fn new(
        hub: Arc<Hub>,
        resolver: Arc<dyn GeoResolver>,
        forward_logs: bool,
        max_inflight_lookups: usize,
    ) -> Self {
        Self {
            hub,
            resolver,
            forward_logs,
            permits: Arc::new(Semaphore::new(max_inflight_lookups.max(1))),
            tracker: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Processes one line. Must be called from within a tokio runtime.
    pub fn on_line(&self, line: &str) -> LineOutcome {
        Counters::bump(&self.counters.lines, 1);

        let mut outcome = LineOutcome::default();
        if self.forward_logs {
            self.hub.publish_log(line);
            outcome.forwarded = true;
        }

        outcome.addresses = extract(line);
        Counters::bump(&self.counters.addresses, outcome.addresses.len() as u64);

        for address in &outcome.addresses {
            let permit = match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!("Lookup capacity reached, skipping {}", address);
                    Counters::bump(&self.counters.shed, 1);
                    outcome.shed += 1;
                    continue;
                }
            };

            let address = address.clone();
            let hub = Arc::clone(&self.hub);
            let resolver = Arc::clone(&self.resolver);
            let counters = Arc::clone(&self.counters);

            self.tracker.spawn_blocking(move || {
                let _permit = permit;
                resolve_and_publish(&address, resolver.as_ref(), &hub, &counters);
            });
            outcome.scheduled += 1;
        }

        outcome
    }

    /// Waits until every lookup started so far has finished
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            lines: c.lines.load(Ordering::Relaxed),
            addresses: c.addresses.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            shed: c.shed.load(Ordering::Relaxed),
        }
    }
}

fn resolve_and_publish(
    address: &Address,
    resolver: &dyn GeoResolver,
    hub: &Hub,
    counters: &Counters,
) {
    match resolver.resolve(address.ip()) {
        Ok(Some(location)) => {
            let record = GeoRecord::new(address, location, Utc::now());
            match hub.publish_geo(&record) {
                Ok(_) => Counters::bump(&counters.resolved, 1),
                Err(e) => {
                    warn!("Failed to publish geo event for {}: {}", address, e);
                    Counters::bump(&counters.failures, 1);
                }
            }
        }
        Ok(None) => {
            trace!("No location for {}", address);
            Counters::bump(&counters.misses, 1);
        }
        Err(e) => {
            warn!("Lookup failed for {}: {}", address, e);
            Counters::bump(&counters.failures, 1);
        }
    }
}
