use super::{ChannelEvent, RemoteChannel, Subscription};
use crate::document::DocumentKey;
use crate::error::Result;
use crate::watcher::{same_file_or_sidecar, FileWatcher};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A channel backed by a SQLite file that several processes (or devices on
/// a shared volume) open at once. Each stored document carries a revision
/// that is bumped on every write; subscribers re-read when the file changes
/// and emit a snapshot only when the revision moved.
pub struct SqliteChannel {
    path: PathBuf,
    conn: Mutex<Connection>,
    followers: Arc<Mutex<HashMap<u64, Follower>>>,
    next_id: AtomicU64,
}

struct Follower {
    key: DocumentKey,
    signals: Sender<WatchSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchSignal {
    /// The database file or one of its sidecars changed on disk.
    Changed,
    /// This process wrote the followed key.
    Nudge,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
struct Record {
    revision: i64,
    data_json: String,
}

impl SqliteChannel {
    /// Open or create the shared database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = open_connection(path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                data_json TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(SqliteChannel {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            followers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current revision of a key; 0 when nothing is stored.
    pub fn revision(&self, key: &DocumentKey) -> Result<i64> {
        Ok(read_record(&self.conn(), key)?.map(|r| r.revision).unwrap_or(0))
    }

    fn nudge(&self, key: &DocumentKey) {
        let followers = self.followers.lock().unwrap_or_else(PoisonError::into_inner);
        for follower in followers.values().filter(|f| &f.key == key) {
            let _ = follower.signals.send(WatchSignal::Nudge);
        }
    }
}

impl RemoteChannel for SqliteChannel {
    fn read(&self, key: &DocumentKey) -> Result<Option<Value>> {
        match read_record(&self.conn(), key)? {
            Some(record) => Ok(Some(serde_json::from_str(&record.data_json)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &DocumentKey, payload: &Value) -> Result<()> {
        let data_json = serde_json::to_string(payload)?;
        self.conn().execute(
            "INSERT INTO documents (key, data_json) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                data_json = excluded.data_json,
                revision = documents.revision + 1,
                updated_at = datetime('now')",
            params![key.to_string(), data_json],
        )?;
        self.nudge(key);
        Ok(())
    }

    fn subscribe(&self, key: &DocumentKey) -> Result<Subscription> {
        let record = read_record(&self.conn(), key)?;
        let revision = record.as_ref().map(|r| r.revision).unwrap_or(0);

        let (event_tx, event_rx) = mpsc::channel();
        let _ = event_tx.send(ChannelEvent::Snapshot(snapshot_payload(key, record)));

        let (signal_tx, signal_rx) = mpsc::channel();
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let on_disk = signal_tx.clone();
        let watcher = FileWatcher::start(&dir, same_file_or_sidecar(&self.path), move |_| {
            on_disk.send(WatchSignal::Changed).is_ok()
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.followers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Follower {
                    key: key.clone(),
                    signals: signal_tx.clone(),
                },
            );

        let path = self.path.clone();
        let followed = key.clone();
        std::thread::spawn(move || {
            follow(path, followed, revision, signal_rx, event_tx, watcher);
        });

        let followers = Arc::downgrade(&self.followers);
        Ok(Subscription::new(key.clone(), event_rx, move || {
            let _ = signal_tx.send(WatchSignal::Stop);
            if let Some(followers) = followers.upgrade() {
                followers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        }))
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    Ok(conn)
}

fn read_record(conn: &Connection, key: &DocumentKey) -> Result<Option<Record>> {
    let result = conn
        .query_row(
            "SELECT revision, data_json FROM documents WHERE key = ?1",
            params![key.to_string()],
            |row| {
                Ok(Record {
                    revision: row.get(0)?,
                    data_json: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(result)
}

/// Stored text that no longer parses is delivered as `null`, which decodes
/// to the default document.
fn snapshot_payload(key: &DocumentKey, record: Option<Record>) -> Option<Value> {
    let record = record?;
    match serde_json::from_str(&record.data_json) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Stored payload for '{key}' is not valid JSON: {e}");
            Some(Value::Null)
        }
    }
}

/// Subscription thread: re-read on every signal and forward snapshots whose
/// revision differs from the last one sent.
fn follow(
    path: PathBuf,
    key: DocumentKey,
    mut revision: i64,
    signals: Receiver<WatchSignal>,
    events: Sender<ChannelEvent>,
    _watcher: FileWatcher,
) {
    let conn = match open_connection(&path) {
        Ok(conn) => conn,
        Err(e) => {
            let _ = events.send(ChannelEvent::Error(e.to_string()));
            return;
        }
    };

    while let Ok(signal) = signals.recv() {
        if signal == WatchSignal::Stop {
            break;
        }
        match read_record(&conn, &key) {
            Ok(record) => {
                let current = record.as_ref().map(|r| r.revision).unwrap_or(0);
                if current == revision {
                    continue;
                }
                revision = current;
                if events
                    .send(ChannelEvent::Snapshot(snapshot_payload(&key, record)))
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Reading '{key}' from {} failed: {e}", path.display());
                let _ = events.send(ChannelEvent::Error(e.to_string()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn open(tmp: &TempDir) -> SqliteChannel {
        SqliteChannel::open(&tmp.path().join("shared.db")).unwrap()
    }

    #[test]
    fn test_write_bumps_revision() {
        let tmp = TempDir::new().unwrap();
        let channel = open(&tmp);
        let key = DocumentKey::Checklist;
        assert_eq!(channel.read(&key).unwrap(), None);
        assert_eq!(channel.revision(&key).unwrap(), 0);

        channel.write(&key, &json!({ "completedItems": ["a"] })).unwrap();
        channel.write(&key, &json!({ "completedItems": ["a", "b"] })).unwrap();
        assert_eq!(channel.revision(&key).unwrap(), 2);
        assert_eq!(
            channel.read(&key).unwrap(),
            Some(json!({ "completedItems": ["a", "b"] }))
        );
    }

    #[test]
    fn test_subscribe_sends_current_snapshot() {
        let tmp = TempDir::new().unwrap();
        let channel = open(&tmp);
        let key = DocumentKey::GuestList;
        channel.write(&key, &json!({ "rows": [] })).unwrap();

        let sub = channel.subscribe(&key).unwrap();
        assert_eq!(
            sub.try_next(),
            Some(ChannelEvent::Snapshot(Some(json!({ "rows": [] }))))
        );
    }

    #[test]
    fn test_own_write_reaches_subscriber() {
        let tmp = TempDir::new().unwrap();
        let channel = open(&tmp);
        let key = DocumentKey::venue("hall-1");
        let sub = channel.subscribe(&key).unwrap();
        assert_eq!(sub.next_timeout(WAIT), Some(ChannelEvent::Snapshot(None)));

        channel.write(&key, &json!({ "venueName": "Hall" })).unwrap();
        assert_eq!(
            sub.next_timeout(WAIT),
            Some(ChannelEvent::Snapshot(Some(json!({ "venueName": "Hall" }))))
        );
    }

    #[test]
    fn test_write_from_other_connection_reaches_subscriber() {
        let tmp = TempDir::new().unwrap();
        let here = open(&tmp);
        let there = open(&tmp);
        let key = DocumentKey::Checklist;
        let sub = here.subscribe(&key).unwrap();
        assert_eq!(sub.next_timeout(WAIT), Some(ChannelEvent::Snapshot(None)));

        there.write(&key, &json!({ "completedItems": ["x"] })).unwrap();
        assert_eq!(
            sub.next_timeout(WAIT),
            Some(ChannelEvent::Snapshot(Some(json!({ "completedItems": ["x"] }))))
        );
    }

    #[test]
    fn test_unsubscribe_removes_follower() {
        let tmp = TempDir::new().unwrap();
        let channel = open(&tmp);
        let sub = channel.subscribe(&DocumentKey::Checklist).unwrap();
        assert_eq!(channel.followers.lock().unwrap().len(), 1);
        sub.unsubscribe();
        assert!(channel.followers.lock().unwrap().is_empty());
    }
}
