//! Device heartbeat.
//!
//! Every [`STATUS_INTERVAL_MS`] the control loop publishes a [`DeviceInfo`]
//! document, retained, on `<base>/status`. The firmware fills in the fields;
//! the schedule and the document shape live here so they run on the host.

use serde::Serialize;

/// Heartbeat period.
pub const STATUS_INTERVAL_MS: u64 = 30_000;

/// Device status document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Low 32 bits of the factory MAC, lowercase hex.
    pub device_id: String,
    /// Seconds since boot.
    pub uptime: u64,
    pub free_heap: u32,
    /// dBm of the associated AP, 0 when not associated.
    pub wifi_rssi: i32,
    pub ip_address: String,
    pub mqtt_connected: bool,
}

impl DeviceInfo {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Fixed-period schedule, measured from boot.
///
/// The first beat is due one full period after boot, not at boot.
#[derive(Debug)]
pub struct Heartbeat {
    interval_ms: u64,
    last_ms: u64,
}

impl Heartbeat {
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: 0,
        }
    }

    /// Is a beat due at `now_ms`? A due beat is consumed, whether or not the
    /// caller manages to publish it.
    pub fn due(&mut self, now_ms: u64) -> bool {
        if now_ms.saturating_sub(self.last_ms) <= self.interval_ms {
            return false;
        }
        self.last_ms = now_ms;
        true
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(STATUS_INTERVAL_MS)
    }
}
