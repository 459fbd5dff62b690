//! Event processor: the single consumer of the event queue.
//!
//! For each event, in order:
//!
//! 1. registry miss → discard (pin removed while the event was queued)
//! 2. pin owned by a running pulse → discard
//! 3. debounce: captured before the last accepted report, or `debounce_ms > 0`
//!    and less than `debounce_ms` after it → discard
//! 4. change detection: `report_interval_ms == 0` and value equals the last
//!    accepted value → discard
//! 5. record the report, then publish
//!
//! "Now" is the event's capture timestamp, so queueing delay never turns a
//! bounce into an accepted report. An event older than the last report is
//! stale whatever the window: a sample read just before a pulse started must
//! not be published after the pulse ended. The first event after
//! configuration always passes both filters.

use std::sync::{Arc, Mutex, PoisonError};

use crate::event::IoEvent;
use crate::publish::Publisher;
use crate::queue::EventQueue;
use crate::registry::PinRegistry;
use crate::stats::PipelineStats;
use crate::{ev_debug, ev_info};

/// What happened to one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Published,
    Orphaned,
    Suppressed,
    Debounced,
    Unchanged,
}

/// Queue consumer applying debounce and change detection.
pub struct EventProcessor {
    queue: Arc<EventQueue>,
    registry: Arc<Mutex<PinRegistry>>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<PipelineStats>,
}

impl EventProcessor {
    pub fn new(
        queue: Arc<EventQueue>,
        registry: Arc<Mutex<PinRegistry>>,
        publisher: Arc<dyn Publisher>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            queue,
            registry,
            publisher,
            stats,
        }
    }

    /// Consume events forever.
    pub fn run(&self) -> ! {
        loop {
            let event = self.queue.pop();
            self.process(event);
        }
    }

    /// Process every queued event without blocking. Returns how many ran.
    pub fn drain_pending(&self) -> usize {
        let mut n = 0;
        while let Some(event) = self.queue.try_pop() {
            self.process(event);
            n += 1;
        }
        n
    }

    /// Apply the filters to one event and publish it if it survives.
    pub fn process(&self, event: IoEvent) -> Outcome {
        let (topic, retain) = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(cfg) = registry.lookup_mut(event.pin) else {
                self.stats.record_orphaned();
                return Outcome::Orphaned;
            };

            if cfg.is_trigger_active() {
                self.stats.record_suppressed();
                return Outcome::Suppressed;
            }

            if let Some(last) = cfg.last_report_ms {
                let bounced = match event.timestamp_ms.checked_sub(last) {
                    Some(since) => since < u64::from(cfg.debounce_ms),
                    None => true,
                };
                if bounced {
                    self.stats.record_debounced();
                    ev_debug!(event.timestamp_ms, "GPIO{} debounced", event.pin);
                    return Outcome::Debounced;
                }
            }

            if cfg.report_interval_ms == 0 && cfg.last_value == Some(event.value) {
                self.stats.record_unchanged();
                return Outcome::Unchanged;
            }

            cfg.record_report(event.value, event.timestamp_ms);
            (cfg.report_topic.clone(), cfg.retain)
        };

        ev_info!(
            event.timestamp_ms,
            "GPIO{} {} -> {}",
            event.pin,
            event.kind.as_str(),
            event.value
        );
        self.publisher.publish(&topic, &event.value.to_string(), retain);
        self.stats.record_published();
        Outcome::Published
    }
}
