//! Host doubles for the hardware seams.
//!
//! [`MockGpio`] keeps pin state in memory and runs the bound interrupt
//! producer when a simulated input level crosses the configured edge.
//! [`MockClock`] is manual: `delay_ms` advances it instead of sleeping.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Clock, GpioPort, HalError};
use crate::capture::InterruptProducer;
use crate::pin::{InterruptEdge, PinMode};

#[derive(Default)]
struct PinState {
    modes: HashMap<u8, PinMode>,
    inputs: HashMap<u8, bool>,
    analog: HashMap<u8, u16>,
    driven: HashMap<u8, bool>,
    interrupts: HashMap<u8, (InterruptEdge, Arc<InterruptProducer>)>,
    broken: HashSet<u8>,
    writes: Vec<(u8, bool)>,
}

impl PinState {
    fn input_level(&self, pin: u8) -> bool {
        match self.inputs.get(&pin) {
            Some(&level) => level,
            // Pull-up modes idle high
            None => matches!(
                self.modes.get(&pin),
                Some(PinMode::InputPullUp | PinMode::Interrupt)
            ),
        }
    }
}

/// In-memory GPIO port.
#[derive(Default)]
pub struct MockGpio {
    state: Mutex<PinState>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PinState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change an input level, firing the interrupt if the edge matches.
    pub fn set_input(&self, pin: u8, high: bool) {
        let producer = {
            let mut state = self.state();
            let was = state.input_level(pin);
            state.inputs.insert(pin, high);
            state
                .interrupts
                .get(&pin)
                .filter(|(edge, _)| edge.fires_on(was, high))
                .map(|(_, producer)| Arc::clone(producer))
        };
        if let Some(producer) = producer {
            producer.capture(high);
        }
    }

    /// Run the pin's interrupt producer as if the edge fired, whatever the level.
    pub fn fire(&self, pin: u8) -> bool {
        let (producer, level) = {
            let state = self.state();
            match state.interrupts.get(&pin) {
                Some((_, producer)) => (Arc::clone(producer), state.input_level(pin)),
                None => return false,
            }
        };
        producer.capture(level);
        true
    }

    pub fn set_analog(&self, pin: u8, raw: u16) {
        self.state().analog.insert(pin, raw);
    }

    /// Make every later operation on `pin` fail.
    pub fn break_pin(&self, pin: u8) {
        self.state().broken.insert(pin);
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.state().modes.get(&pin).copied()
    }

    pub fn has_interrupt(&self, pin: u8) -> bool {
        self.state().interrupts.contains_key(&pin)
    }

    /// Levels written to `pin`, in order.
    pub fn writes(&self, pin: u8) -> Vec<bool> {
        self.state()
            .writes
            .iter()
            .filter(|(p, _)| *p == pin)
            .map(|&(_, level)| level)
            .collect()
    }
}

impl GpioPort for MockGpio {
    fn apply_mode(&self, pin: u8, mode: PinMode) -> Result<(), HalError> {
        let mut state = self.state();
        if state.broken.contains(&pin) {
            return Err(HalError::InvalidPin(pin));
        }
        state.modes.insert(pin, mode);
        if mode == PinMode::Output {
            state.driven.insert(pin, false);
        }
        Ok(())
    }

    fn read_level(&self, pin: u8) -> bool {
        let state = self.state();
        match state.modes.get(&pin) {
            Some(PinMode::Output) => state.driven.get(&pin).copied().unwrap_or(false),
            _ => state.input_level(pin),
        }
    }

    fn read_analog(&self, pin: u8) -> u16 {
        self.state().analog.get(&pin).copied().unwrap_or(0)
    }

    fn write_level(&self, pin: u8, high: bool) -> Result<(), HalError> {
        let mut state = self.state();
        if state.broken.contains(&pin) {
            return Err(HalError::InvalidPin(pin));
        }
        state.driven.insert(pin, high);
        state.writes.push((pin, high));
        Ok(())
    }

    fn driven_level(&self, pin: u8) -> bool {
        self.state().driven.get(&pin).copied().unwrap_or(false)
    }

    fn attach_interrupt(
        &self,
        pin: u8,
        edge: InterruptEdge,
        producer: InterruptProducer,
    ) -> Result<(), HalError> {
        let mut state = self.state();
        if state.broken.contains(&pin) {
            return Err(HalError::InvalidPin(pin));
        }
        if edge == InterruptEdge::None {
            return Err(HalError::Unsupported);
        }
        state.interrupts.insert(pin, (edge, Arc::new(producer)));
        Ok(())
    }

    fn detach_interrupt(&self, pin: u8) {
        self.state().interrupts.remove(&pin);
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct MockClock {
    now_ms: AtomicU64,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(u64::from(ms));
    }
}
