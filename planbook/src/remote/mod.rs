// Remote document channel - whole-document read/write plus push snapshots
// for one key at a time

pub mod memory;
pub mod sqlite;

use crate::document::DocumentKey;
use crate::error::Result;
use serde_json::Value;
use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

pub use memory::MemoryChannel;
pub use sqlite::SqliteChannel;

/// Something a subscription delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The current stored payload, `None` when nothing is stored yet.
    Snapshot(Option<Value>),
    /// The subscription failed and will deliver nothing further.
    Error(String),
}

/// Shared storage addressed by document key. A write replaces the whole
/// payload; the last write to arrive wins.
pub trait RemoteChannel: Send + Sync {
    fn read(&self, key: &DocumentKey) -> Result<Option<Value>>;

    fn write(&self, key: &DocumentKey, payload: &Value) -> Result<()>;

    /// Open a subscription. The current snapshot is delivered first, then
    /// one snapshot per later change, in order.
    fn subscribe(&self, key: &DocumentKey) -> Result<Subscription>;
}

/// A live subscription. Dropping it (or calling `unsubscribe`) releases the
/// channel-side registration.
pub struct Subscription {
    key: DocumentKey,
    events: mpsc::Receiver<ChannelEvent>,
    disposer: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        key: DocumentKey,
        events: mpsc::Receiver<ChannelEvent>,
        disposer: impl FnOnce() + Send + 'static,
    ) -> Self {
        Subscription {
            key,
            events,
            disposer: Some(Box::new(disposer)),
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    /// Next buffered event, if any. A channel side that went away without
    /// reporting an error is reported as one.
    pub fn try_next(&self) -> Option<ChannelEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(self.closed()),
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ChannelEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(self.closed()),
        }
    }

    pub fn unsubscribe(self) {}

    fn closed(&self) -> ChannelEvent {
        ChannelEvent::Error(format!("subscription to '{}' closed", self.key))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(dispose) = self.disposer.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}
