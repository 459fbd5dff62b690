//! Telemetry sink.
//!
//! Publishing is best-effort: the core never waits for or checks delivery.

use std::sync::{Arc, Mutex, PoisonError};

use crate::hal::Clock;

/// Message bus sink.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, value: &str, retained: bool);
}

/// One recorded publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub value: String,
    pub retained: bool,
    /// Clock time of the publish, 0 without a clock.
    pub at_ms: u64,
}

/// Publisher that records every message, for host builds and tests.
#[derive(Default)]
pub struct RecordingPublisher {
    clock: Option<Arc<dyn Clock>>,
    records: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp each record with `clock.now_ms()`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock: Some(clock),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<Published> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Values published to `topic`, in order.
    pub fn values_for(&self, topic: &str) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.topic == topic)
            .map(|r| r.value.clone())
            .collect()
    }

    pub fn last(&self) -> Option<Published> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, value: &str, retained: bool) {
        let at_ms = self.clock.as_ref().map_or(0, |c| c.now_ms());
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Published {
                topic: topic.to_string(),
                value: value.to_string(),
                retained,
                at_ms,
            });
    }
}

#[cfg(target_os = "espidf")]
pub use mqtt::MqttPublisher;

#[cfg(target_os = "espidf")]
mod mqtt {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    use esp_idf_svc::mqtt::client::{EspMqttClient, QoS};

    use super::Publisher;

    /// Publisher over the ESP-IDF MQTT client.
    ///
    /// Messages are enqueued (never block on the network) and only while the
    /// connection flag is set; anything else is dropped.
    pub struct MqttPublisher {
        client: Mutex<EspMqttClient<'static>>,
        connected: Arc<AtomicBool>,
    }

    impl MqttPublisher {
        pub fn new(client: EspMqttClient<'static>, connected: Arc<AtomicBool>) -> Self {
            Self {
                client: Mutex::new(client),
                connected,
            }
        }

        pub fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }

        pub fn subscribe(&self, topic: &str) -> Result<(), esp_idf_svc::sys::EspError> {
            self.client
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribe(topic, QoS::AtMostOnce)
                .map(|_| ())
        }
    }

    impl Publisher for MqttPublisher {
        fn publish(&self, topic: &str, value: &str, retained: bool) {
            if !self.connected.load(Ordering::Acquire) {
                return;
            }
            let mut client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = client.enqueue(topic, QoS::AtMostOnce, retained, value.as_bytes()) {
                log::debug!("publish {} dropped: {:?}", topic, e);
            }
        }
    }
}
