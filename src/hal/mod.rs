//! Hardware Abstraction Layer for RustVaultIO.
//!
//! Thin seams around ESP-IDF peripherals.
//! Business logic stays in core modules, HAL is just I/O.
//!
//! - [`GpioPort`]: pin modes, levels, ADC reads and edge interrupts
//! - [`Clock`]: monotonic milliseconds and blocking delays
//! - [`signal::Signal`]: ISR-safe wakeup for the event queue consumer
//!
//! Firmware builds use [`esp`]; host builds get [`mock`] doubles so the whole
//! pipeline runs under `cargo test`.

pub mod signal;

#[cfg(target_os = "espidf")]
pub mod esp;

#[cfg(not(target_os = "espidf"))]
pub mod mock;

use crate::capture::InterruptProducer;
use crate::pin::{InterruptEdge, PinMode};

/// HAL failure.
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    /// Pin does not exist on this chip or cannot take the requested role.
    #[error("GPIO{0} is not usable for this operation")]
    InvalidPin(u8),

    /// Mode or edge has no hardware equivalent.
    #[error("unsupported pin operation")]
    Unsupported,

    /// ESP-IDF driver call failed.
    #[cfg(target_os = "espidf")]
    #[error("ESP-IDF error: {0}")]
    Esp(#[from] esp_idf_svc::sys::EspError),
}

/// Digital/analog pin access.
///
/// Implementations must be shareable between the control context, the
/// sampler and the trigger executor. The interrupt producer handed to
/// [`attach_interrupt`](GpioPort::attach_interrupt) is owned by the port until
/// [`detach_interrupt`](GpioPort::detach_interrupt) returns.
pub trait GpioPort: Send + Sync {
    /// Put the pin into the hardware mode. Output pins start driven low.
    fn apply_mode(&self, pin: u8, mode: PinMode) -> Result<(), HalError>;

    /// Read the current logic level.
    fn read_level(&self, pin: u8) -> bool;

    /// Read the raw ADC value.
    fn read_analog(&self, pin: u8) -> u16;

    /// Drive an output pin.
    fn write_level(&self, pin: u8, high: bool) -> Result<(), HalError>;

    /// Level the pin is currently driven to.
    fn driven_level(&self, pin: u8) -> bool;

    /// Bind an interrupt producer to the pin's edge.
    ///
    /// The producer runs in interrupt context: it reads the level, timestamps it
    /// and pushes onto the event queue. Nothing else.
    fn attach_interrupt(
        &self,
        pin: u8,
        edge: InterruptEdge,
        producer: InterruptProducer,
    ) -> Result<(), HalError>;

    /// Unbind the producer. After this returns the producer is never called again.
    fn detach_interrupt(&self, pin: u8);
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Milliseconds since boot. Safe to call from interrupt context.
    fn now_ms(&self) -> u64;

    /// Block the calling task.
    fn delay_ms(&self, ms: u32);
}
