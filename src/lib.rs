//! # RustVaultIO
//!
//! Runtime-configurable GPIO pin pipeline with MQTT telemetry.
//!
//! ## Architecture
//!
//! All pin observations flow through one [`EventQueue`]:
//! - Producers (edge interrupts, periodic sampler) push, never block
//! - One consumer ([`EventProcessor`]) applies debounce and change detection
//! - Output triggers bypass the queue and publish directly
//! - Pin configuration lives in one locked [`PinRegistry`]; interrupt
//!   context never touches it
//!
//! [`IoService`] wires the pieces together for the firmware.

pub mod capture;
pub mod commands;
pub mod config;
pub mod device;
pub mod event;
pub mod hal;
pub mod log_drain;
pub mod log_globals;
pub mod logging;
pub mod pin;
pub mod processor;
pub mod publish;
pub mod queue;
pub mod registry;
pub mod service;
pub mod stats;
pub mod store;
pub mod trigger;

pub use capture::{Capture, InterruptProducer, PeriodicSampler};
pub use config::{ConfigError, ExclusionRequest, ExclusionSet, PinRange, PinRequest, TriggerRequest};
pub use device::{DeviceInfo, Heartbeat};
pub use event::{EventKind, IoEvent};
pub use log_globals::EVENT_LOG;
pub use pin::{InterruptEdge, PinConfig, PinMode, TriggerAction};
pub use processor::{EventProcessor, Outcome};
pub use publish::Publisher;
pub use queue::{EventQueue, QueueInitError, QUEUE_CAPACITY};
pub use registry::PinRegistry;
pub use service::{IoService, ServiceError};
pub use stats::{PipelineStats, StatsSnapshot};
pub use store::DurableStore;
pub use trigger::{TriggerError, TriggerExecutor};
