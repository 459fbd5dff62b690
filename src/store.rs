//! Durable key/value storage.
//!
//! The core only needs strings under a namespace: the registry writes its
//! pin set and exclusion set as JSON documents. Firmware backs this with NVS;
//! host builds and tests use [`MemoryStore`].
//!
//! Used only from the control context.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Storage write failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend not usable (partition missing, namespace cannot be opened).
    #[error("storage unavailable")]
    Unavailable,

    /// NVS read/write error.
    #[cfg(target_os = "espidf")]
    #[error("NVS error: {0}")]
    Nvs(#[from] esp_idf_svc::sys::EspError),
}

/// Persistent string store.
pub trait DurableStore: Send {
    /// Read a value. Missing keys and read failures both yield `None`.
    fn get(&self, namespace: &str, key: &str) -> Option<String>;

    /// Write a value.
    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store.
///
/// Clones share the same map, so a test can keep a handle while the
/// registry owns another, and "restart" by building a new registry over it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
pub use nvs::EspNvsStore;

#[cfg(target_os = "espidf")]
mod nvs {
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

    use super::{DurableStore, StoreError};

    /// Largest document read back from NVS.
    const MAX_VALUE_LEN: usize = 4000;

    /// NVS-backed store. Opens the namespace per call.
    pub struct EspNvsStore {
        partition: EspDefaultNvsPartition,
    }

    impl EspNvsStore {
        pub fn new(partition: EspDefaultNvsPartition) -> Self {
            Self { partition }
        }

        fn open(&self, namespace: &str) -> Result<EspNvs<NvsDefault>, StoreError> {
            Ok(EspNvs::new(self.partition.clone(), namespace, true)?)
        }
    }

    impl DurableStore for EspNvsStore {
        fn get(&self, namespace: &str, key: &str) -> Option<String> {
            let storage = self.open(namespace).ok()?;
            let len = storage.str_len(key).ok()??;
            let mut buf = vec![0u8; len.min(MAX_VALUE_LEN) + 1];
            match storage.get_str(key, &mut buf) {
                Ok(Some(value)) => Some(value.to_string()),
                Ok(None) => None,
                Err(e) => {
                    log::warn!("NVS read {}/{} failed: {:?}", namespace, key, e);
                    None
                }
            }
        }

        fn put(&self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
            let mut storage = self.open(namespace)?;
            storage.set_str(key, value)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_namespaces_are_separate() {
        let store = MemoryStore::new();
        store.put("io", "pins", "a").unwrap();
        store.put("mqtt", "pins", "b").unwrap();

        assert_eq!(store.get("io", "pins").as_deref(), Some("a"));
        assert_eq!(store.get("mqtt", "pins").as_deref(), Some("b"));
        assert_eq!(store.get("io", "exclude"), None);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.put("io", "k", "v").unwrap();
        assert_eq!(handle.get("io", "k").as_deref(), Some("v"));
        assert_eq!(handle.len(), 1);
    }
}
