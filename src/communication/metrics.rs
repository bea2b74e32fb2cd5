//! Counters and gauges for the communication manager
//!
//! Counters are bumped on the hot path with relaxed atomics. Periodically the
//! manager pushes them, together with a few gauges, to a [`MetricSink`]. The
//! default sink writes debug lines on the `metrics` log target; tests install
//! a [`RecordingSink`] to capture emissions.

use crate::core::sync::lock_or_recover;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{EnumCount as EnumCountMacro, EnumIter, IntoStaticStr};

/// Everything the manager counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCountMacro, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Counter {
    /// Messages accepted into the queue
    Enqueued,
    /// Inbound messages handed to the pipeline
    Delivered,
    CommandsSent,
    RepliesSent,
    /// Ingestion refused because the manager was closed
    DroppedClosed,
    RepliesWithoutContext,
    UnknownReplies,
    RouteFailures,
    SendFailures,
    /// Inbound frames that could not be decoded
    ConversionFailures,
    ConfigRejected,
    AbortedOnClose,
    DiscardedOnClose,
}

impl Counter {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricEvent {
    pub name: &'static str,
    pub value: MetricValue,
}

pub trait MetricSink: Send + Sync {
    fn record(&self, event: MetricEvent);
}

/// Sink writing every event to the log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn record(&self, event: MetricEvent) {
        match event.value {
            MetricValue::Counter(value) => {
                log::debug!(target: "metrics", "counter {}={}", event.name, value)
            }
            MetricValue::Gauge(value) => {
                log::debug!(target: "metrics", "gauge {}={}", event.name, value)
            }
        }
    }
}

/// Sink keeping every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        lock_or_recover(&self.events, "recording sink").clone()
    }

    /// Most recent value recorded under `name`
    pub fn last(&self, name: &str) -> Option<MetricValue> {
        lock_or_recover(&self.events, "recording sink")
            .iter()
            .rev()
            .find(|event| event.name == name)
            .map(|event| event.value)
    }
}

impl MetricSink for RecordingSink {
    fn record(&self, event: MetricEvent) {
        lock_or_recover(&self.events, "recording sink").push(event);
    }
}

/// Atomic counter set
#[derive(Debug)]
pub struct CommunicationMetrics {
    counters: [AtomicU64; Counter::COUNT],
}

impl CommunicationMetrics {
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, amount: u64) {
        self.counters[counter as usize].fetch_add(amount, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    /// Every counter with its current value
    pub fn counters(&self) -> Vec<(Counter, u64)> {
        Counter::iter().map(|c| (c, self.get(c))).collect()
    }
}

impl Default for CommunicationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the manager's metrics
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub queue_depth: u64,
    pub pending_commands: u64,
    pub retired_generations: u64,
    pub counters: Vec<(Counter, u64)>,
}

impl MetricsSnapshot {
    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters
            .iter()
            .find(|(c, _)| *c == counter)
            .map(|(_, value)| *value)
            .unwrap_or(0)
    }

    /// Push the snapshot to `sink`, gauges first
    pub fn emit(&self, sink: &dyn MetricSink) {
        let gauges = [
            ("queue_depth", self.queue_depth),
            ("pending_commands", self.pending_commands),
            ("retired_generations", self.retired_generations),
        ];
        for (name, value) in gauges {
            sink.record(MetricEvent {
                name,
                value: MetricValue::Gauge(value),
            });
        }
        for (counter, value) in &self.counters {
            sink.record(MetricEvent {
                name: counter.name(),
                value: MetricValue::Counter(*value),
            });
        }
    }
}
