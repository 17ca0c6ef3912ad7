use super::{ChannelEvent, RemoteChannel, Subscription};
use crate::document::DocumentKey;
use crate::error::{PlanbookError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An in-process channel shared by cloning. Every clone sees the same
/// documents and subscribers, which makes it a stand-in for several
/// devices talking to one backend.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    hub: Arc<Mutex<Hub>>,
}

#[derive(Default)]
struct Hub {
    documents: HashMap<DocumentKey, Value>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    reject_writes: bool,
    reject_subscriptions: bool,
    writes: usize,
}

struct Subscriber {
    id: u64,
    key: DocumentKey,
    tx: Sender<ChannelEvent>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following write fail until switched back.
    pub fn reject_writes(&self, reject: bool) {
        self.hub().reject_writes = reject;
    }

    /// Make every following subscribe call fail until switched back.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.hub().reject_subscriptions = reject;
    }

    /// Fail all live subscriptions to `key`.
    pub fn disconnect(&self, key: &DocumentKey) {
        let mut hub = self.hub();
        hub.subscribers.retain(|sub| {
            if &sub.key == key {
                let _ = sub
                    .tx
                    .send(ChannelEvent::Error(format!("connection to '{key}' lost")));
                false
            } else {
                true
            }
        });
    }

    pub fn subscriber_count(&self, key: &DocumentKey) -> usize {
        self.hub().subscribers.iter().filter(|s| &s.key == key).count()
    }

    /// Number of accepted writes.
    pub fn write_count(&self) -> usize {
        self.hub().writes
    }
}

impl RemoteChannel for MemoryChannel {
    fn read(&self, key: &DocumentKey) -> Result<Option<Value>> {
        Ok(self.hub().documents.get(key).cloned())
    }

    fn write(&self, key: &DocumentKey, payload: &Value) -> Result<()> {
        let mut hub = self.hub();
        if hub.reject_writes {
            return Err(PlanbookError::Remote(format!("write to '{key}' rejected")));
        }
        hub.documents.insert(key.clone(), payload.clone());
        hub.writes += 1;
        // Subscribers whose receiver is gone are dropped here
        hub.subscribers.retain(|sub| {
            &sub.key != key || sub.tx.send(ChannelEvent::Snapshot(Some(payload.clone()))).is_ok()
        });
        Ok(())
    }

    fn subscribe(&self, key: &DocumentKey) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel();
        let id = {
            let mut hub = self.hub();
            if hub.reject_subscriptions {
                return Err(PlanbookError::Subscription(format!(
                    "subscription to '{key}' refused"
                )));
            }
            let current = hub.documents.get(key).cloned();
            let _ = tx.send(ChannelEvent::Snapshot(current));
            hub.next_id += 1;
            let id = hub.next_id;
            hub.subscribers.push(Subscriber {
                id,
                key: key.clone(),
                tx,
            });
            id
        };

        let hub = Arc::downgrade(&self.hub);
        Ok(Subscription::new(key.clone(), rx, move || {
            if let Some(hub) = hub.upgrade() {
                let mut hub = hub.lock().unwrap_or_else(PoisonError::into_inner);
                hub.subscribers.retain(|s| s.id != id);
            }
        }))
    }
}
