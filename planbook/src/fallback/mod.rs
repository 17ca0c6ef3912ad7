// Local fallback store - last document written from this device, used to
// seed the view when the remote channel is unavailable

pub mod sqlite;

use crate::document::DocumentKey;
use crate::error::{PlanbookError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub use sqlite::SqliteFallback;

/// Device-local key/value persistence of serialized payloads. One entry per
/// document key; a `put` overwrites.
pub trait FallbackStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, payload: &str) -> Result<()>;
    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Store a payload under the document key.
pub fn put_payload(store: &dyn FallbackStore, key: &DocumentKey, payload: &Value) -> Result<()> {
    let text = serde_json::to_string(payload)?;
    store.put(&key.to_string(), &text)
}

/// Read back a payload. An entry that no longer parses is reported as absent.
pub fn get_payload(store: &dyn FallbackStore, key: &DocumentKey) -> Result<Option<Value>> {
    let Some(text) = store.get(&key.to_string())? else {
        return Ok(None);
    };
    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("Ignoring unreadable fallback entry for '{key}': {e}");
            Ok(None)
        }
    }
}

/// Process-local fallback, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryFallback {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryFallback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FallbackStore for MemoryFallback {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, payload: &str) -> Result<()> {
        if key.is_empty() {
            return Err(PlanbookError::Fallback("empty key".into()));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
