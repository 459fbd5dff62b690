//! Module: event
//!
//! Purpose: IoEvent, the unit of work handed from the capture producers to the
//! event processor. One event is one observation of one pin at one instant.
//!
//! Architecture:
//! - Plain `Copy` value, small enough to move inside a critical section
//! - Created by the interrupt producer or the periodic sampler
//! - Consumed exactly once by the event processor, then discarded
//!
//! Safety: Safe. No unsafe blocks. Copy types only.

/// Where an event came from and how its value should be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Digital logic level (0 or 1), from an edge interrupt or a digital sample.
    Digital = 0,

    /// Raw ADC reading from the periodic sampler.
    AnalogSample = 1,

    /// State change caused by an output trigger.
    Trigger = 2,
}

impl EventKind {
    /// Lowercase name, used in event-path log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Digital => "digital",
            EventKind::AnalogSample => "analog",
            EventKind::Trigger => "trigger",
        }
    }
}

/// A single captured pin observation.
///
/// Timestamps are milliseconds from the same monotonic [`Clock`](crate::hal::Clock)
/// that the processor and trigger executor use, so they can be compared directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoEvent {
    /// Hardware pin number.
    pub pin: u8,

    /// Producer that created the event.
    pub kind: EventKind,

    /// Observed value: 0/1 for digital, raw counts for analog.
    pub value: i32,

    /// Capture time in milliseconds.
    pub timestamp_ms: u64,
}

impl IoEvent {
    /// Placeholder used to pre-fill fixed buffers.
    pub const EMPTY: Self = Self {
        pin: 0,
        kind: EventKind::Digital,
        value: 0,
        timestamp_ms: 0,
    };

    /// Digital level observation.
    #[inline]
    pub const fn digital(pin: u8, high: bool, timestamp_ms: u64) -> Self {
        Self {
            pin,
            kind: EventKind::Digital,
            value: high as i32,
            timestamp_ms,
        }
    }

    /// Analog sample observation.
    #[inline]
    pub const fn analog(pin: u8, raw: u16, timestamp_ms: u64) -> Self {
        Self {
            pin,
            kind: EventKind::AnalogSample,
            value: raw as i32,
            timestamp_ms,
        }
    }

    /// Check if the value represents a high digital level.
    #[inline]
    pub fn is_high(&self) -> bool {
        self.value != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_event_value() {
        let high = IoEvent::digital(4, true, 10);
        assert_eq!(high.value, 1);
        assert_eq!(high.kind, EventKind::Digital);
        assert!(high.is_high());

        let low = IoEvent::digital(4, false, 11);
        assert_eq!(low.value, 0);
        assert!(!low.is_high());
    }

    #[test]
    fn test_analog_event_keeps_raw_counts() {
        let ev = IoEvent::analog(34, 4095, 500);
        assert_eq!(ev.kind, EventKind::AnalogSample);
        assert_eq!(ev.value, 4095);
        assert_eq!(ev.timestamp_ms, 500);
    }

    #[test]
    fn test_event_is_small() {
        // Copied inside a critical section from ISR context
        assert!(core::mem::size_of::<IoEvent>() <= 16);
    }
}
