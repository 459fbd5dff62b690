//! Persisted pin and exclusion sets with schema versioning.
//!
//! # Layout (namespace `io`)
//!
//! | key          | value                                          |
//! |--------------|------------------------------------------------|
//! | `schema_ver` | decimal version of the documents below         |
//! | `pins`       | `{"pins":[<PinRequest>, ...]}`                 |
//! | `exclude`    | `{"pins":[..],"ranges":[{"from":a,"to":b}]}`   |
//!
//! # Version History
//!
//! - **v1** (current): pin requests as JSON objects, exclusion as JSON object
//!
//! # Corruption
//!
//! A document that does not parse is treated exactly like "nothing saved".
//! Inside the pin document each entry is decoded on its own, so one bad entry
//! is skipped without losing the rest.

use core::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::config::{ExclusionSet, PinRequest};
use crate::store::{DurableStore, StoreError};

/// Current schema version for the `io` namespace
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// NVS namespace for pin configuration
pub const NVS_NAMESPACE: &str = "io";

/// NVS key for schema version
const VERSION_KEY: &str = "schema_ver";

/// NVS key for the persisted pin set
const PINS_KEY: &str = "pins";

/// NVS key for the exclusion set
const EXCLUDE_KEY: &str = "exclude";

/// Result of checking the stored schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaCheck {
    /// Nothing stored yet
    FreshInstall,
    /// Stored version matches
    UpToDate,
    /// Written by newer firmware; downgrade not supported
    TooNew { stored_version: u32 },
}

/// Stored document could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("persisted {key} document is corrupt: {reason}")]
pub struct PersistedConfigCorrupt {
    pub key: &'static str,
    pub reason: String,
}

/// Pin requests recovered from storage.
#[derive(Debug, Default)]
pub struct LoadedPins {
    pub requests: Vec<PinRequest>,
    /// Entries that failed to decode.
    pub skipped: usize,
}

#[derive(Serialize)]
struct PinsDocument<'a> {
    pins: &'a [PinRequest],
}

/// Check the stored schema version.
///
/// An unreadable version stamp counts as a fresh install.
pub fn check_schema(store: &dyn DurableStore) -> SchemaCheck {
    let stored_version = store
        .get(NVS_NAMESPACE, VERSION_KEY)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    match stored_version.cmp(&CURRENT_SCHEMA_VERSION) {
        Ordering::Equal => SchemaCheck::UpToDate,
        // No migrations exist yet: v0 means nothing was ever written
        Ordering::Less => SchemaCheck::FreshInstall,
        Ordering::Greater => SchemaCheck::TooNew { stored_version },
    }
}

/// Load the persisted pin set.
///
/// `Ok` with an empty set when nothing is stored; `Err` when the document
/// exists but is not a JSON object with a `pins` array.
pub fn load_pins(store: &dyn DurableStore) -> Result<LoadedPins, PersistedConfigCorrupt> {
    let Some(raw) = store.get(NVS_NAMESPACE, PINS_KEY) else {
        return Ok(LoadedPins::default());
    };
    if raw.trim().is_empty() {
        return Ok(LoadedPins::default());
    }

    let doc: Value = serde_json::from_str(&raw).map_err(|e| PersistedConfigCorrupt {
        key: PINS_KEY,
        reason: e.to_string(),
    })?;

    let entries = doc
        .get("pins")
        .and_then(Value::as_array)
        .ok_or_else(|| PersistedConfigCorrupt {
            key: PINS_KEY,
            reason: "no pins array".to_string(),
        })?;

    let mut loaded = LoadedPins::default();
    for entry in entries {
        match serde_json::from_value::<PinRequest>(entry.clone()) {
            Ok(req) => loaded.requests.push(req),
            Err(_) => loaded.skipped += 1,
        }
    }
    Ok(loaded)
}

/// Write the persisted pin set, stamping the schema version first.
pub fn save_pins(store: &dyn DurableStore, pins: &[PinRequest]) -> Result<(), StoreError> {
    let doc = serde_json::to_string(&PinsDocument { pins })
        .unwrap_or_else(|_| String::from(r#"{"pins":[]}"#));
    store.put(NVS_NAMESPACE, VERSION_KEY, &CURRENT_SCHEMA_VERSION.to_string())?;
    store.put(NVS_NAMESPACE, PINS_KEY, &doc)
}

/// Load the persisted exclusion set. `Ok(None)` when nothing is stored.
pub fn load_exclusion(
    store: &dyn DurableStore,
) -> Result<Option<ExclusionSet>, PersistedConfigCorrupt> {
    let Some(raw) = store.get(NVS_NAMESPACE, EXCLUDE_KEY) else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| PersistedConfigCorrupt {
            key: EXCLUDE_KEY,
            reason: e.to_string(),
        })
}

/// Write the exclusion set.
pub fn save_exclusion(store: &dyn DurableStore, set: &ExclusionSet) -> Result<(), StoreError> {
    let doc = serde_json::to_string(set).unwrap_or_else(|_| String::from("{}"));
    store.put(NVS_NAMESPACE, VERSION_KEY, &CURRENT_SCHEMA_VERSION.to_string())?;
    store.put(NVS_NAMESPACE, EXCLUDE_KEY, &doc)
}
