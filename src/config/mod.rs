//! Module: config
//!
//! Purpose: Typed configuration requests for pins, exclusions and triggers.
//!
//! Architecture:
//! - Requests are serde types with `deny_unknown_fields`: a misspelled key is
//!   rejected at the boundary instead of silently taking a default
//! - Optional fields stay `Option` in the request; defaults are applied only by
//!   [`PinRequest::validate`], which produces the typed [`PinConfig`]
//! - [`persist`]: NVS layout with schema versioning
//!
//! Validation never partially applies anything: it is a pure function from a
//! request to either a complete `PinConfig` or one [`ConfigError`].

pub mod persist;

use serde::{Deserialize, Serialize};

use crate::hal::HalError;
use crate::pin::{
    InterruptEdge, PinConfig, PinMode, DEFAULT_DEBOUNCE_MS, DEFAULT_INTERVAL_MS, DEFAULT_PULSE_MS,
};

/// Why a configure request was refused.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Pin is wired to flash/boot hardware.
    #[error("GPIO{0} is reserved")]
    Reserved(u8),

    /// Pin is in the administrator exclusion set.
    #[error("GPIO{0} is excluded")]
    Excluded(u8),

    /// Required field absent or empty.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// String does not name a known enumerator.
    #[error("invalid {field}: '{value}'")]
    InvalidEnum { field: &'static str, value: String },

    /// Validation passed but the hardware refused the mode.
    #[error("hardware: {0}")]
    Hardware(#[from] HalError),
}

impl ConfigError {
    /// Short stable code for status publication.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Reserved(_) => "E10",
            Self::Excluded(_) => "E11",
            Self::MissingField(_) => "E12",
            Self::InvalidEnum { .. } => "E13",
            Self::Hardware(_) => "E14",
        }
    }
}

/// Pin configuration request.
///
/// | field        | default  |
/// |--------------|----------|
/// | mode         | `input`  |
/// | edge         | `change` |
/// | debounce     | 50 ms    |
/// | pulse        | 100 ms   |
/// | interval     | 0 ms     |
/// | report_topic | required |
/// | persist      | false    |
/// | retain       | false    |
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinRequest {
    pub pin: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retain: Option<bool>,
}

impl PinRequest {
    /// Minimal request: pin and topic, everything else defaulted.
    pub fn new(pin: u8, report_topic: impl Into<String>) -> Self {
        Self {
            pin,
            mode: None,
            edge: None,
            debounce: None,
            pulse: None,
            interval: None,
            report_topic: Some(report_topic.into()),
            persist: None,
            retain: None,
        }
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    pub fn with_edge(mut self, edge: &str) -> Self {
        self.edge = Some(edge.to_string());
        self
    }

    pub fn with_debounce(mut self, ms: u32) -> Self {
        self.debounce = Some(ms);
        self
    }

    pub fn with_pulse(mut self, ms: u32) -> Self {
        self.pulse = Some(ms);
        self
    }

    pub fn with_interval(mut self, ms: u32) -> Self {
        self.interval = Some(ms);
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = Some(retain);
        self
    }

    /// Field and enumerator validation.
    ///
    /// Pin admission (reserved / excluded) is checked by the registry before
    /// this runs, so a reserved pin never reports a field error.
    pub fn validate(&self) -> Result<PinConfig, ConfigError> {
        let report_topic = match self.report_topic.as_deref() {
            Some(topic) if !topic.is_empty() => topic.to_string(),
            _ => return Err(ConfigError::MissingField("report_topic")),
        };

        let mode = match self.mode.as_deref() {
            None => PinMode::default(),
            Some(s) => PinMode::parse(s).ok_or_else(|| ConfigError::InvalidEnum {
                field: "mode",
                value: s.to_string(),
            })?,
        };

        let edge = match self.edge.as_deref() {
            None => InterruptEdge::Change,
            Some(s) => InterruptEdge::parse(s).ok_or_else(|| ConfigError::InvalidEnum {
                field: "edge",
                value: s.to_string(),
            })?,
        };

        Ok(PinConfig {
            pin: self.pin,
            mode,
            edge: if mode == PinMode::Interrupt {
                edge
            } else {
                InterruptEdge::None
            },
            debounce_ms: self.debounce.unwrap_or(DEFAULT_DEBOUNCE_MS),
            pulse_width_ms: self.pulse.unwrap_or(DEFAULT_PULSE_MS),
            report_interval_ms: self.interval.unwrap_or(DEFAULT_INTERVAL_MS),
            report_topic,
            persist: self.persist.unwrap_or(false),
            retain: self.retain.unwrap_or(false),
            last_report_ms: None,
            last_value: None,
            trigger_active: false,
        })
    }
}

/// Inclusive pin range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinRange {
    pub from: u8,
    pub to: u8,
}

impl PinRange {
    /// A range with `from > to` contains nothing.
    #[inline]
    pub fn contains(&self, pin: u8) -> bool {
        self.from <= pin && pin <= self.to
    }
}

/// Administrator denylist layered over the reserved pins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExclusionSet {
    #[serde(default)]
    pub pins: Vec<u8>,
    #[serde(default)]
    pub ranges: Vec<PinRange>,
}

impl ExclusionSet {
    pub fn contains(&self, pin: u8) -> bool {
        self.pins.contains(&pin) || self.ranges.iter().any(|r| r.contains(pin))
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty() && self.ranges.is_empty()
    }
}

/// Exclusion update request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExclusionRequest {
    #[serde(default)]
    pub pins: Vec<u8>,
    #[serde(default)]
    pub ranges: Vec<PinRange>,
    #[serde(default)]
    pub persist: bool,
}

impl ExclusionRequest {
    pub fn into_parts(self) -> (ExclusionSet, bool) {
        (
            ExclusionSet {
                pins: self.pins,
                ranges: self.ranges,
            },
            self.persist,
        )
    }
}

/// Output trigger request.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerRequest {
    pub pin: u8,
    pub action: String,
    /// Overrides the pin's configured pulse width.
    #[serde(default, alias = "pulse")]
    pub pulse_width_ms: Option<u32>,
}

impl TriggerRequest {
    pub fn new(pin: u8, action: &str) -> Self {
        Self {
            pin,
            action: action.to_string(),
            pulse_width_ms: None,
        }
    }

    pub fn with_pulse_width(mut self, ms: u32) -> Self {
        self.pulse_width_ms = Some(ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_on_validate() {
        let cfg = PinRequest::new(4, "home/in4").validate().unwrap();
        assert_eq!(cfg.mode, PinMode::Input);
        assert_eq!(cfg.edge, InterruptEdge::None);
        assert_eq!(cfg.debounce_ms, 50);
        assert_eq!(cfg.pulse_width_ms, 100);
        assert_eq!(cfg.report_interval_ms, 0);
        assert!(!cfg.persist);
        assert!(!cfg.retain);
        assert_eq!(cfg.last_report_ms, None);
        assert_eq!(cfg.last_value, None);
    }

    #[test]
    fn test_interrupt_edge_defaults_to_change() {
        let cfg = PinRequest::new(4, "t").with_mode("interrupt").validate().unwrap();
        assert_eq!(cfg.edge, InterruptEdge::Change);
    }

    #[test]
    fn test_empty_topic_is_missing_field() {
        let mut req = PinRequest::new(4, "");
        assert!(matches!(req.validate(), Err(ConfigError::MissingField("report_topic"))));
        req.report_topic = None;
        assert!(matches!(req.validate(), Err(ConfigError::MissingField("report_topic"))));
    }

    #[test]
    fn test_bad_edge_rejected_even_for_non_interrupt_mode() {
        let req = PinRequest::new(4, "t").with_mode("input").with_edge("sideways");
        match req.validate() {
            Err(ConfigError::InvalidEnum { field, value }) => {
                assert_eq!(field, "edge");
                assert_eq!(value, "sideways");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_key_rejected_by_serde() {
        let json = r#"{"pin":4,"report_topic":"t","debunce":10}"#;
        assert!(serde_json::from_str::<PinRequest>(json).is_err());
    }

    #[test]
    fn test_wrong_type_rejected_by_serde() {
        let json = r#"{"pin":4,"report_topic":"t","interval":"often"}"#;
        assert!(serde_json::from_str::<PinRequest>(json).is_err());
    }

    #[test]
    fn test_exclusion_contains() {
        let set = ExclusionSet {
            pins: vec![2],
            ranges: vec![PinRange { from: 20, to: 23 }, PinRange { from: 30, to: 25 }],
        };
        assert!(set.contains(2));
        assert!(set.contains(20));
        assert!(set.contains(23));
        assert!(!set.contains(24));
        assert!(!set.contains(27));
    }

    #[test]
    fn test_trigger_request_accepts_pulse_alias() {
        let req: TriggerRequest =
            serde_json::from_str(r#"{"pin":4,"action":"pulse","pulse":200}"#).unwrap();
        assert_eq!(req.pulse_width_ms, Some(200));

        let req: TriggerRequest =
            serde_json::from_str(r#"{"pin":4,"action":"pulse","pulse_width_ms":150}"#).unwrap();
        assert_eq!(req.pulse_width_ms, Some(150));
    }
}
