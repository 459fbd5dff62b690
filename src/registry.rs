//! Pin registry: the table of configured pins and the exclusion policy.
//!
//! # Admission order
//!
//! 1. reserved pin → [`ConfigError::Reserved`]
//! 2. excluded pin → [`ConfigError::Excluded`]
//! 3. fields and enumerators → `MissingField` / `InvalidEnum`
//!
//! A reserved pin that is also excluded always reports `Reserved`.
//!
//! # Sharing
//!
//! The registry lives behind one `Mutex`, shared by the control context
//! (configure/remove/exclusion), the event processor, the sampler and the
//! trigger executor. Interrupt producers never touch it. Lock holders never
//! publish or sleep.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capture::Capture;
use crate::config::persist::{self, SchemaCheck};
use crate::config::{ConfigError, ExclusionSet, PinRequest};
use crate::hal::GpioPort;
use crate::pin::{is_reserved, PinConfig, PinMode};
use crate::store::DurableStore;

/// Outcome of [`PinRegistry::restore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    /// An exclusion set was loaded.
    pub exclusion_loaded: bool,
    /// Pins configured from storage.
    pub restored: usize,
    /// Stored entries that did not decode or were refused.
    pub skipped: usize,
}

/// Table of configured pins.
pub struct PinRegistry {
    pins: BTreeMap<u8, PinConfig>,
    exclusion: ExclusionSet,
    gpio: Arc<dyn GpioPort>,
    capture: Capture,
    store: Box<dyn DurableStore>,
}

impl PinRegistry {
    pub fn new(gpio: Arc<dyn GpioPort>, capture: Capture, store: Box<dyn DurableStore>) -> Self {
        Self {
            pins: BTreeMap::new(),
            exclusion: ExclusionSet::default(),
            gpio,
            capture,
            store,
        }
    }

    /// Load the persisted exclusion set, then the persisted pins.
    ///
    /// Corrupt documents count as "nothing saved". Entries that fail to decode
    /// or are refused (e.g. now excluded) are skipped one by one. The stored
    /// set is not rewritten, so a skipped pin comes back once it is admitted
    /// again.
    pub fn restore(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();

        match persist::check_schema(self.store.as_ref()) {
            SchemaCheck::FreshInstall => {
                log::info!("No saved pin configuration");
                return report;
            }
            SchemaCheck::TooNew { stored_version } => {
                log::warn!(
                    "Saved pin configuration is schema v{} (supported v{}), ignoring",
                    stored_version,
                    persist::CURRENT_SCHEMA_VERSION
                );
                return report;
            }
            SchemaCheck::UpToDate => {}
        }

        match persist::load_exclusion(self.store.as_ref()) {
            Ok(Some(set)) => {
                self.exclusion = set;
                report.exclusion_loaded = true;
            }
            Ok(None) => {}
            Err(e) => log::warn!("{}", e),
        }

        let loaded = match persist::load_pins(self.store.as_ref()) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("{}", e);
                return report;
            }
        };
        report.skipped = loaded.skipped;

        for request in &loaded.requests {
            match self.apply(request) {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    log::warn!("Skipping saved GPIO{}: {}", request.pin, e);
                    report.skipped += 1;
                }
            }
        }

        log::info!(
            "Restored {} pin(s), skipped {}",
            report.restored,
            report.skipped
        );
        report
    }

    /// Validate and apply a configuration request.
    ///
    /// An existing entry for the pin is fully replaced: its interrupt is
    /// detached before the new mode is applied. If the hardware refuses the new
    /// mode the pin is left unconfigured, in the store as well.
    pub fn configure(&mut self, request: &PinRequest) -> Result<(), ConfigError> {
        let prior_persisted = self.pins.get(&request.pin).is_some_and(|cfg| cfg.persist);
        let result = self.apply(request);

        let current = self.pins.get(&request.pin);
        let persisted = current.is_some_and(|cfg| cfg.persist);
        // A hardware failure has already dropped the old entry; a rejected
        // request has left it untouched
        let replaced = result.is_ok() || current.is_none();
        if persisted || (prior_persisted && replaced) {
            self.save_pins();
        }
        result
    }

    /// Admission, validation and hardware application without touching the
    /// store.
    fn apply(&mut self, request: &PinRequest) -> Result<(), ConfigError> {
        self.admit(request.pin)?;
        let config = request.validate()?;

        if let Some(prior) = self.pins.remove(&config.pin) {
            self.release(&prior);
        }

        self.gpio.apply_mode(config.pin, config.mode)?;
        if config.mode == PinMode::Interrupt {
            let producer = self.capture.producer(config.pin);
            self.gpio.attach_interrupt(config.pin, config.edge, producer)?;
        }

        log::info!(
            "GPIO{} configured: mode={} topic={} interval={}ms",
            config.pin,
            config.mode.as_str(),
            config.report_topic,
            config.report_interval_ms
        );
        self.pins.insert(config.pin, config);
        Ok(())
    }

    fn admit(&self, pin: u8) -> Result<(), ConfigError> {
        if is_reserved(pin) {
            return Err(ConfigError::Reserved(pin));
        }
        if self.exclusion.contains(pin) {
            return Err(ConfigError::Excluded(pin));
        }
        Ok(())
    }

    fn release(&self, config: &PinConfig) {
        if config.mode == PinMode::Interrupt {
            self.gpio.detach_interrupt(config.pin);
        }
    }

    /// Remove a pin. Returns whether it was configured.
    pub fn remove(&mut self, pin: u8) -> bool {
        let Some(config) = self.pins.remove(&pin) else {
            return false;
        };
        self.release(&config);
        if config.persist {
            self.save_pins();
        }
        log::info!("GPIO{} removed", pin);
        true
    }

    /// Replace the exclusion set. Already configured pins are not affected.
    pub fn set_exclusion(&mut self, set: ExclusionSet, persist: bool) {
        self.exclusion = set;
        if persist {
            if let Err(e) = persist::save_exclusion(self.store.as_ref(), &self.exclusion) {
                log::warn!("Failed to persist exclusion set: {}", e);
            }
        }
    }

    pub fn exclusion(&self) -> &ExclusionSet {
        &self.exclusion
    }

    pub fn lookup(&self, pin: u8) -> Option<&PinConfig> {
        self.pins.get(&pin)
    }

    /// Processing-state access for the processor and trigger executor.
    pub(crate) fn lookup_mut(&mut self, pin: u8) -> Option<&mut PinConfig> {
        self.pins.get_mut(&pin)
    }

    /// Configured pins in pin order.
    pub fn iter(&self) -> impl Iterator<Item = &PinConfig> {
        self.pins.values()
    }

    /// Copy of every configured pin, in pin order.
    pub fn snapshot(&self) -> Vec<PinConfig> {
        self.pins.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Write every persisted entry. Failures are logged, never returned.
    fn save_pins(&self) {
        let requests: Vec<PinRequest> = self
            .pins
            .values()
            .filter(|cfg| cfg.persist)
            .map(PinConfig::to_request)
            .collect();

        if let Err(e) = persist::save_pins(self.store.as_ref(), &requests) {
            log::warn!("Failed to persist pin set: {}", e);
        }
    }
}
