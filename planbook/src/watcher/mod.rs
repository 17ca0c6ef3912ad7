use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const DEBOUNCE: Duration = Duration::from_millis(100);

/// A debounced change to a watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// The kind of file change detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// Watches one directory and hands debounced batches of relevant changes to
/// a callback on a background thread. Dropping the watcher stops the thread.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _thread: std::thread::JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching `dir` (non-recursively). Paths rejected by
    /// `is_relevant` are ignored. `on_change` receives each batch, deduplicated
    /// per path, once 100ms pass without further events; returning `false`
    /// stops the thread.
    pub fn start<R, C>(dir: &Path, is_relevant: R, mut on_change: C) -> Result<Self, notify::Error>
    where
        R: Fn(&Path) -> bool + Send + 'static,
        C: FnMut(Vec<WatcherEvent>) -> bool + Send + 'static,
    {
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let thread = std::thread::spawn(move || {
            let mut pending: Vec<(PathBuf, ChangeKind)> = Vec::new();
            let mut last_event = Instant::now();

            loop {
                match notify_rx.recv_timeout(DEBOUNCE) {
                    Ok(Ok(event)) => {
                        if let Some(kind) = change_kind(&event.kind) {
                            for path in event.paths {
                                if is_relevant(&path) {
                                    pending.push((path, kind));
                                }
                            }
                        }
                        last_event = Instant::now();
                    }
                    Ok(Err(e)) => {
                        log::warn!("File watcher error: {e}");
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if !pending.is_empty() && last_event.elapsed() >= DEBOUNCE {
                            // Keep the last change kind per path
                            let mut seen = HashMap::new();
                            for (path, kind) in pending.drain(..) {
                                seen.insert(path, kind);
                            }
                            let batch = seen
                                .into_iter()
                                .map(|(path, kind)| WatcherEvent { path, kind })
                                .collect();
                            if !on_change(batch) {
                                return;
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(FileWatcher {
            _watcher: watcher,
            _thread: thread,
        })
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Matches `path` and its SQLite sidecars (`-wal`, `-shm`, `-journal`).
pub fn same_file_or_sidecar(target: &Path) -> impl Fn(&Path) -> bool + Send + 'static {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    move |path: &Path| {
        path.file_name()
            .map(|n| n.to_string_lossy().starts_with(name.as_str()))
            .unwrap_or(false)
    }
}
