//! IoService: the pin pipeline wired together.
//!
//! ```text
//!                  ┌──────────── IoService (control context) ───────────┐
//!  configure ────▶ │ PinRegistry ◀── PeriodicSampler::tick              │
//!  trigger ──────▶ │ TriggerExecutor ──────────────────────▶ Publisher  │
//!                  └──────┬─────────────────────────────────────▲───────┘
//!                         │ InterruptProducer (ISR)             │
//!                         ▼                                     │
//!                     EventQueue ──▶ EventProcessor ("io-worker")
//! ```
//!
//! Everything except the worker thread and the ISRs runs in the caller's
//! context. The registry is the only state shared with the worker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::Serialize;

use crate::capture::{Capture, PeriodicSampler};
use crate::config::{ConfigError, ExclusionRequest, ExclusionSet, PinRequest, TriggerRequest};
use crate::event::IoEvent;
use crate::hal::{Clock, GpioPort};
use crate::pin::PinMode;
use crate::processor::EventProcessor;
use crate::publish::Publisher;
use crate::queue::{EventQueue, QueueInitError};
use crate::registry::{PinRegistry, RestoreReport};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::store::DurableStore;
use crate::trigger::{TriggerError, TriggerExecutor};

/// Name of the processor thread.
pub const WORKER_NAME: &str = "io-worker";

const WORKER_STACK_SIZE: usize = 6 * 1024;

/// The capture subsystem could not start.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("event queue: {0}")]
    Queue(#[from] QueueInitError),

    #[error("cannot spawn io-worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Queue(_) => "E30",
            Self::Spawn(_) => "E31",
        }
    }
}

/// One line of the status report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PinStatus {
    pub pin: u8,
    pub mode: &'static str,
    pub report_topic: String,
    pub interval: u32,
}

#[derive(Serialize)]
struct StatusDocument<'a> {
    pins: &'a [PinStatus],
}

/// Runtime-configurable pin pipeline.
pub struct IoService {
    registry: Arc<Mutex<PinRegistry>>,
    capture: Capture,
    gpio: Arc<dyn GpioPort>,
    publisher: Arc<dyn Publisher>,
    processor: Arc<EventProcessor>,
    sampler: PeriodicSampler,
    triggers: TriggerExecutor,
    stats: Arc<PipelineStats>,
    restored: RestoreReport,
}

impl IoService {
    /// Build the pipeline, restore saved pins and start the worker thread.
    pub fn begin(
        gpio: Arc<dyn GpioPort>,
        clock: Arc<dyn Clock>,
        store: Box<dyn DurableStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, ServiceError> {
        let service = Self::without_worker(gpio, clock, store, publisher)?;

        let processor = Arc::clone(&service.processor);
        thread::Builder::new()
            .name(WORKER_NAME.into())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || processor.run())?;

        log::info!("{} started", WORKER_NAME);
        Ok(service)
    }

    /// Build the pipeline without a worker thread.
    ///
    /// Queued events are processed only by
    /// [`process_pending`](Self::process_pending).
    pub fn without_worker(
        gpio: Arc<dyn GpioPort>,
        clock: Arc<dyn Clock>,
        store: Box<dyn DurableStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, ServiceError> {
        let queue = Arc::new(EventQueue::new()?);
        let capture = Capture::new(Arc::clone(&queue), Arc::clone(&clock));
        let stats = Arc::new(PipelineStats::new());

        let mut registry = PinRegistry::new(Arc::clone(&gpio), capture.clone(), store);
        let restored = registry.restore();
        let registry = Arc::new(Mutex::new(registry));

        let processor = Arc::new(EventProcessor::new(
            queue,
            Arc::clone(&registry),
            Arc::clone(&publisher),
            Arc::clone(&stats),
        ));
        let sampler = PeriodicSampler::new(capture.clone(), Arc::clone(&gpio));
        let triggers = TriggerExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&gpio),
            clock,
            Arc::clone(&publisher),
        );

        Ok(Self {
            registry,
            capture,
            gpio,
            publisher,
            processor,
            sampler,
            triggers,
            stats,
            restored,
        })
    }

    fn registry(&self) -> MutexGuard<'_, PinRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configure a pin, then queue one sample of it so its current state is
    /// reported through the normal filters. Output pins and periodically
    /// sampled pins get no initial sample.
    pub fn configure(&self, request: &PinRequest) -> Result<(), ConfigError> {
        let initial = {
            let mut registry = self.registry();
            registry.configure(request)?;
            registry
                .lookup(request.pin)
                .filter(|cfg| cfg.mode != PinMode::Output && !cfg.is_sampled())
                .map(|cfg| cfg.mode)
        };

        if let Some(mode) = initial {
            let event = self.read(request.pin, mode);
            self.capture.push_sample(event);
        }
        Ok(())
    }

    pub fn remove(&self, pin: u8) -> bool {
        self.registry().remove(pin)
    }

    pub fn set_exclusion(&self, request: ExclusionRequest) {
        let (set, persist) = request.into_parts();
        self.registry().set_exclusion(set, persist);
    }

    pub fn exclusion(&self) -> ExclusionSet {
        self.registry().exclusion().clone()
    }

    pub fn trigger(&self, request: &TriggerRequest) -> Result<(), TriggerError> {
        self.triggers.execute(request)
    }

    /// Configured pins, in pin order.
    pub fn status(&self) -> Vec<PinStatus> {
        self.registry()
            .iter()
            .map(|cfg| PinStatus {
                pin: cfg.pin,
                mode: cfg.mode.as_str(),
                report_topic: cfg.report_topic.clone(),
                interval: cfg.report_interval_ms,
            })
            .collect()
    }

    /// `{"pins":[{"pin":..,"mode":..,"report_topic":..,"interval":..}]}`
    pub fn status_json(&self) -> String {
        let pins = self.status();
        serde_json::to_string(&StatusDocument { pins: &pins })
            .unwrap_or_else(|_| String::from(r#"{"pins":[]}"#))
    }

    /// Read and publish every configured pin, bypassing debounce and change
    /// detection. Returns the number of pins published.
    pub fn report_all(&self) -> usize {
        let targets: Vec<(u8, PinMode, String, bool)> = self
            .registry()
            .iter()
            .map(|cfg| (cfg.pin, cfg.mode, cfg.report_topic.clone(), cfg.retain))
            .collect();

        for (pin, mode, topic, retain) in &targets {
            let event = self.read(*pin, *mode);
            self.publisher.publish(topic, &event.value.to_string(), *retain);
        }
        targets.len()
    }

    /// Run the periodic sampler. Call once per control-loop iteration.
    pub fn tick(&mut self) -> usize {
        self.sampler.tick(&self.registry)
    }

    /// Process queued events in the calling thread.
    pub fn process_pending(&self) -> usize {
        self.processor.drain_pending()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.evicted = self.capture.queue().evicted();
        snapshot
    }

    /// What the start-up restore found.
    pub fn restored(&self) -> RestoreReport {
        self.restored
    }

    pub fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    fn read(&self, pin: u8, mode: PinMode) -> IoEvent {
        let now = self.capture.clock().now_ms();
        match mode {
            PinMode::Analog => IoEvent::analog(pin, self.gpio.read_analog(pin), now),
            _ => IoEvent::digital(pin, self.gpio.read_level(pin), now),
        }
    }
}
