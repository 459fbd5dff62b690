//! Pin configuration types.
//!
//! [`PinConfig`] is the validated, typed form of a configuration request. The
//! string forms used on the wire (`"input_pullup"`, `"falling"`, `"pulse"`) are
//! parsed here and nowhere else.

use crate::config::PinRequest;

/// Pins wired to the SPI flash on the classic ESP32. Never configurable.
#[cfg(not(feature = "esp32s3"))]
pub const RESERVED_PINS: &[u8] = &[6, 7, 8, 9, 10, 11];

/// Pins wired to the SPI flash / octal PSRAM on the ESP32-S3. Never configurable.
#[cfg(feature = "esp32s3")]
pub const RESERVED_PINS: &[u8] = &[26, 27, 28, 29, 30, 31, 32];

/// Default minimum interval between accepted reports.
pub const DEFAULT_DEBOUNCE_MS: u32 = 50;

/// Default width for the `pulse` trigger.
pub const DEFAULT_PULSE_MS: u32 = 100;

/// Default sampling period (0 = report on change only).
pub const DEFAULT_INTERVAL_MS: u32 = 0;

/// Check whether a pin belongs to the fixed reserved set.
#[inline]
pub fn is_reserved(pin: u8) -> bool {
    RESERVED_PINS.contains(&pin)
}

/// Hardware pin mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PinMode {
    /// Push-pull output, starts low.
    Output,
    /// Floating digital input.
    #[default]
    Input,
    /// Digital input with internal pull-up.
    InputPullUp,
    /// ADC input.
    Analog,
    /// Pulled-up digital input with an edge interrupt.
    Interrupt,
}

impl PinMode {
    /// Parse the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "output" => Some(PinMode::Output),
            "input" => Some(PinMode::Input),
            "input_pullup" => Some(PinMode::InputPullUp),
            "analog" => Some(PinMode::Analog),
            "interrupt" => Some(PinMode::Interrupt),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            PinMode::Output => "output",
            PinMode::Input => "input",
            PinMode::InputPullUp => "input_pullup",
            PinMode::Analog => "analog",
            PinMode::Interrupt => "interrupt",
        }
    }
}

/// Interrupt edge sensitivity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InterruptEdge {
    /// No interrupt (any mode other than `Interrupt`).
    #[default]
    None,
    Rising,
    Falling,
    Change,
}

impl InterruptEdge {
    /// Parse the wire name. `None` is not accepted on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rising" => Some(InterruptEdge::Rising),
            "falling" => Some(InterruptEdge::Falling),
            "change" => Some(InterruptEdge::Change),
            _ => None,
        }
    }

    /// Wire name, `None` for [`InterruptEdge::None`].
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            InterruptEdge::None => None,
            InterruptEdge::Rising => Some("rising"),
            InterruptEdge::Falling => Some("falling"),
            InterruptEdge::Change => Some("change"),
        }
    }

    /// Check whether a level transition fires this edge.
    pub fn fires_on(self, from: bool, to: bool) -> bool {
        match self {
            InterruptEdge::None => false,
            InterruptEdge::Rising => !from && to,
            InterruptEdge::Falling => from && !to,
            InterruptEdge::Change => from != to,
        }
    }
}

/// Explicit output action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerAction {
    /// Drive high.
    Set,
    /// Drive low.
    Reset,
    /// High, wait, low.
    Pulse,
    /// Invert the driven level.
    Toggle,
}

impl TriggerAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "set" => Some(TriggerAction::Set),
            "reset" => Some(TriggerAction::Reset),
            "pulse" => Some(TriggerAction::Pulse),
            "toggle" => Some(TriggerAction::Toggle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerAction::Set => "set",
            TriggerAction::Reset => "reset",
            TriggerAction::Pulse => "pulse",
            TriggerAction::Toggle => "toggle",
        }
    }
}

/// One configured pin.
///
/// The first block of fields is user configuration and is immutable once
/// stored. `last_report_ms` / `last_value` are processing state: `None` until
/// the first accepted report, then written only by the event processor and the
/// trigger executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinConfig {
    pub pin: u8,
    pub mode: PinMode,
    /// Meaningful only when `mode == Interrupt`, otherwise `None`.
    pub edge: InterruptEdge,
    pub debounce_ms: u32,
    pub pulse_width_ms: u32,
    pub report_interval_ms: u32,
    pub report_topic: String,
    pub persist: bool,
    pub retain: bool,

    pub last_report_ms: Option<u64>,
    pub last_value: Option<i32>,

    /// Set while a pulse trigger owns the pin.
    pub(crate) trigger_active: bool,
}

impl PinConfig {
    /// Is this pin read by the periodic sampler?
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.report_interval_ms > 0 && !self.report_topic.is_empty()
    }

    /// Is this pin currently owned by a running pulse?
    #[inline]
    pub fn is_trigger_active(&self) -> bool {
        self.trigger_active
    }

    /// Persistable subset, in request form.
    pub fn to_request(&self) -> PinRequest {
        PinRequest {
            pin: self.pin,
            mode: Some(self.mode.as_str().to_string()),
            edge: self.edge.as_str().map(str::to_string),
            debounce: Some(self.debounce_ms),
            pulse: Some(self.pulse_width_ms),
            interval: Some(self.report_interval_ms),
            report_topic: Some(self.report_topic.clone()),
            persist: Some(self.persist),
            retain: Some(self.retain),
        }
    }

    /// Record an accepted report.
    #[inline]
    pub(crate) fn record_report(&mut self, value: i32, at_ms: u64) {
        self.last_value = Some(value);
        self.last_report_ms = Some(at_ms);
    }
}
