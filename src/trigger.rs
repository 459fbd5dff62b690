//! Output trigger executor.
//!
//! Triggers bypass the event queue: the executor drives the pin, records the
//! new state in the registry and publishes it directly.
//!
//! # Concurrency
//!
//! Each pin has its own trigger lock, so triggers on one pin run one at a
//! time while triggers on different pins run independently (two pulses on
//! different pins may overlap). A pulse holds only its pin's lock while it
//! waits; the registry lock is never held across the wait.
//!
//! While a pulse runs the pin is marked trigger-active: the sampler skips it
//! and the processor discards its events, so nothing else is published for the
//! pin between its "1" and "0". The flag is cleared under the same registry
//! lock that records the "0", so no sample slips in between.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::TriggerRequest;
use crate::event::{EventKind, IoEvent};
use crate::hal::{Clock, GpioPort, HalError};
use crate::pin::{PinMode, TriggerAction};
use crate::publish::Publisher;
use crate::registry::PinRegistry;
use crate::{ev_info, ev_warn};

/// Why a trigger was refused or failed.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("GPIO{0} is not configured")]
    NotConfigured(u8),

    #[error("GPIO{0} is not an output")]
    NotOutput(u8),

    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("hardware: {0}")]
    Hardware(#[from] HalError),
}

impl TriggerError {
    /// Short stable code for status publication.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "E20",
            Self::NotOutput(_) => "E21",
            Self::InvalidAction(_) => "E22",
            Self::Hardware(_) => "E23",
        }
    }
}

/// Fields copied out of the registry for one trigger.
struct Target {
    topic: String,
    retain: bool,
    pulse_width_ms: u32,
}

/// Applies set/reset/pulse/toggle to output pins.
pub struct TriggerExecutor {
    registry: Arc<Mutex<PinRegistry>>,
    gpio: Arc<dyn GpioPort>,
    clock: Arc<dyn Clock>,
    publisher: Arc<dyn Publisher>,
    pin_locks: Mutex<HashMap<u8, Arc<Mutex<()>>>>,
}

impl TriggerExecutor {
    pub fn new(
        registry: Arc<Mutex<PinRegistry>>,
        gpio: Arc<dyn GpioPort>,
        clock: Arc<dyn Clock>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            registry,
            gpio,
            clock,
            publisher,
            pin_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn execute(&self, request: &TriggerRequest) -> Result<(), TriggerError> {
        self.trigger(request.pin, &request.action, request.pulse_width_ms)
    }

    /// Run one action on an output pin.
    ///
    /// `pulse` blocks the caller for the full pulse width, taken from
    /// `pulse_width_ms` or else the pin's configured default.
    pub fn trigger(
        &self,
        pin: u8,
        action: &str,
        pulse_width_ms: Option<u32>,
    ) -> Result<(), TriggerError> {
        let pin_lock = self.pin_lock(pin);
        let _serialized = pin_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (action, target) = self.resolve(pin, action)?;

        match action {
            TriggerAction::Set => self.drive(pin, true, &target),
            TriggerAction::Reset => self.drive(pin, false, &target),
            TriggerAction::Toggle => {
                let level = !self.gpio.driven_level(pin);
                self.drive(pin, level, &target)
            }
            TriggerAction::Pulse => {
                self.pulse(pin, pulse_width_ms.unwrap_or(target.pulse_width_ms), &target)
            }
        }
    }

    /// Checks in order: configured, output, known action.
    fn resolve(&self, pin: u8, action: &str) -> Result<(TriggerAction, Target), TriggerError> {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let cfg = registry.lookup(pin).ok_or(TriggerError::NotConfigured(pin))?;
        if cfg.mode != PinMode::Output {
            return Err(TriggerError::NotOutput(pin));
        }
        let action =
            TriggerAction::parse(action).ok_or_else(|| TriggerError::InvalidAction(action.into()))?;

        Ok((
            action,
            Target {
                topic: cfg.report_topic.clone(),
                retain: cfg.retain,
                pulse_width_ms: cfg.pulse_width_ms,
            },
        ))
    }

    fn drive(&self, pin: u8, high: bool, target: &Target) -> Result<(), TriggerError> {
        self.gpio.write_level(pin, high)?;
        self.report(pin, high, target, false);
        Ok(())
    }

    fn pulse(&self, pin: u8, width_ms: u32, target: &Target) -> Result<(), TriggerError> {
        self.set_active(pin, true);

        if let Err(e) = self.gpio.write_level(pin, true) {
            self.set_active(pin, false);
            return Err(e.into());
        }
        self.report(pin, true, target, false);

        self.clock.delay_ms(width_ms);

        if let Err(e) = self.gpio.write_level(pin, false) {
            self.set_active(pin, false);
            return Err(e.into());
        }
        self.report(pin, false, target, true);
        Ok(())
    }

    /// Record the driven level and publish it, unless the pin was removed
    /// meanwhile. `end_pulse` also hands the pin back to the sampler.
    fn report(&self, pin: u8, high: bool, target: &Target, end_pulse: bool) {
        let event = IoEvent {
            pin,
            kind: EventKind::Trigger,
            value: high as i32,
            timestamp_ms: self.clock.now_ms(),
        };

        {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            match registry.lookup_mut(pin) {
                Some(cfg) => {
                    if end_pulse {
                        cfg.trigger_active = false;
                    }
                    cfg.record_report(event.value, event.timestamp_ms);
                }
                None => {
                    ev_warn!(event.timestamp_ms, "GPIO{} removed during trigger", pin);
                    return;
                }
            }
        }

        ev_info!(
            event.timestamp_ms,
            "GPIO{} {} -> {}",
            pin,
            event.kind.as_str(),
            event.value
        );
        self.publisher
            .publish(&target.topic, &event.value.to_string(), target.retain);
    }

    fn set_active(&self, pin: u8, active: bool) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cfg) = registry.lookup_mut(pin) {
            cfg.trigger_active = active;
        }
    }

    fn pin_lock(&self, pin: u8) -> Arc<Mutex<()>> {
        let mut locks = self.pin_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(pin).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            TriggerError::NotConfigured(4).code(),
            TriggerError::NotOutput(4).code(),
            TriggerError::InvalidAction("x".into()).code(),
            TriggerError::Hardware(HalError::Unsupported).code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
