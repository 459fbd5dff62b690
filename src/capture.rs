//! Event producers.
//!
//! ```text
//! edge ISR ──▶ InterruptProducer::capture ──┐
//!                                           ├──▶ EventQueue
//! control loop ──▶ PeriodicSampler::tick ───┘
//! ```
//!
//! The interrupt producer is a per-pin context object handed to the GPIO port
//! at registration time. It holds only the pin number, the queue and the
//! clock: it never touches the registry, the store or the publisher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::event::IoEvent;
use crate::hal::{Clock, GpioPort};
use crate::pin::PinMode;
use crate::queue::EventQueue;
use crate::registry::PinRegistry;

/// Queue and clock shared by every producer.
#[derive(Clone)]
pub struct Capture {
    queue: Arc<EventQueue>,
    clock: Arc<dyn Clock>,
}

impl Capture {
    pub fn new(queue: Arc<EventQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    /// Build the interrupt context object for one pin.
    pub fn producer(&self, pin: u8) -> InterruptProducer {
        InterruptProducer {
            pin,
            queue: Arc::clone(&self.queue),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Queue an event built in task context.
    pub fn push_sample(&self, event: IoEvent) -> bool {
        self.queue.try_push(event)
    }
}

/// Interrupt-context producer bound to one pin.
///
/// # Timing
///
/// `capture` is O(1): one clock read, one queue push. No allocation, no
/// locks other than the queue's critical section.
pub struct InterruptProducer {
    pin: u8,
    queue: Arc<EventQueue>,
    clock: Arc<dyn Clock>,
}

impl InterruptProducer {
    #[inline]
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Record the level read by the edge handler.
    ///
    /// Returns `false` if the queue had to evict an older event.
    #[inline]
    pub fn capture(&self, high: bool) -> bool {
        let now = self.clock.now_ms();
        self.queue.try_push(IoEvent::digital(self.pin, high, now))
    }
}

/// Periodic sampler for pins with a report interval.
///
/// Called once per control-loop tick. A pin is due when both its last
/// accepted report and its last sample are at least `report_interval_ms` old;
/// the second condition keeps a pin whose samples keep getting debounced from
/// being re-sampled on every tick.
pub struct PeriodicSampler {
    capture: Capture,
    gpio: Arc<dyn GpioPort>,
    sampled_at: HashMap<u8, u64>,
}

impl PeriodicSampler {
    pub fn new(capture: Capture, gpio: Arc<dyn GpioPort>) -> Self {
        Self {
            capture,
            gpio,
            sampled_at: HashMap::new(),
        }
    }

    /// Sample every due pin. Returns the number of events queued.
    pub fn tick(&mut self, registry: &Mutex<PinRegistry>) -> usize {
        let now = self.capture.clock.now_ms();

        let due: Vec<(u8, PinMode)> = {
            let registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            self.sampled_at.retain(|pin, _| registry.lookup(*pin).is_some());

            registry
                .iter()
                .filter(|cfg| cfg.is_sampled() && !cfg.is_trigger_active())
                .filter(|cfg| {
                    let interval = u64::from(cfg.report_interval_ms);
                    let elapsed = |since: Option<u64>| match since {
                        Some(t) => now.saturating_sub(t) >= interval,
                        None => true,
                    };
                    elapsed(cfg.last_report_ms) && elapsed(self.sampled_at.get(&cfg.pin).copied())
                })
                .map(|cfg| (cfg.pin, cfg.mode))
                .collect()
        };

        for &(pin, mode) in &due {
            let event = match mode {
                PinMode::Analog => IoEvent::analog(pin, self.gpio.read_analog(pin), now),
                _ => IoEvent::digital(pin, self.gpio.read_level(pin), now),
            };
            self.sampled_at.insert(pin, now);
            self.capture.push_sample(event);
        }

        due.len()
    }
}
