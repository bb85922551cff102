use crate::DEFAULT_EVENT_CAPACITY;
use crate::kind::changes;
use ddns_core::traits::{ChangeKind, ChangeKinds, FileWatcher, WatchEvent};
use ddns_core::{Error, Result};
use notify::{Config, Event, INotifyWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

/// Watched path → subscribed change kinds
#[derive(Debug, Default)]
struct WatchTable {
    kinds: HashMap<PathBuf, ChangeKinds>,
}

impl WatchTable {
    /// Locate the watch an event path belongs to
    ///
    /// An event on a watched path itself has an empty name; otherwise the
    /// parent must be watched.
    fn resolve(&self, path: &Path, kind: ChangeKind) -> Option<WatchEvent> {
        if let Some(kinds) = self.kinds.get(path) {
            return kinds
                .contains(kind)
                .then(|| WatchEvent::new(path, OsString::new(), kind));
        }

        let dir = path.parent()?;
        let name = path.file_name()?;
        let kinds = self.kinds.get(dir)?;
        kinds.contains(kind).then(|| WatchEvent::new(dir, name, kind))
    }
}

/// State shared between `add_watch` callers and notify's event thread
struct Shared {
    table: RwLock<WatchTable>,
    sender: Mutex<Option<mpsc::Sender<WatchEvent>>>,
}

impl Shared {
    fn new(sender: mpsc::Sender<WatchEvent>) -> Self {
        Self {
            table: RwLock::new(WatchTable::default()),
            sender: Mutex::new(Some(sender)),
        }
    }

    fn is_watched(&self, path: &Path) -> bool {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.kinds.contains_key(path)
    }

    /// Hand an event to the consumer; returns `false` once the consumer is gone
    fn send(&self, event: WatchEvent) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                debug!(
                    path = %dropped.path().display(),
                    "Watch event channel full, dropping event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// inotify-backed [`FileWatcher`]
///
/// Events are produced on notify's inotify thread and handed to the async
/// side through a bounded channel. Dropping the watcher closes it.
pub struct InotifyWatcher {
    shared: Arc<Shared>,
    backend: Mutex<Option<INotifyWatcher>>,
    events: Mutex<Option<mpsc::Receiver<WatchEvent>>>,
}

impl InotifyWatcher {
    /// Acquire an inotify handle
    ///
    /// # Returns
    ///
    /// - `Ok(watcher)`: Handle acquired
    /// - `Err(Error::Resource)`: The kernel refused (EMFILE, ENFILE, ENOMEM)
    pub fn open() -> Result<Self> {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Acquire an inotify handle with an event channel of `capacity`
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(Shared::new(tx));

        let handler = Arc::clone(&shared);
        let backend = INotifyWatcher::new(
            move |result: notify::Result<Event>| dispatch(&handler, result),
            Config::default(),
        )
        .map_err(|e| Error::resource(format!("Failed to open inotify handle: {}", e)))?;

        debug!("inotify handle opened");
        Ok(Self {
            shared,
            backend: Mutex::new(Some(backend)),
            events: Mutex::new(Some(rx)),
        })
    }

    /// Paths currently watched
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let table = self.shared.table.read().unwrap_or_else(PoisonError::into_inner);
        table.kinds.keys().cloned().collect()
    }
}

impl FileWatcher for InotifyWatcher {
    fn add_watch(&self, path: &Path, kinds: ChangeKinds) -> Result<()> {
        let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(backend) = backend.as_mut() else {
            return Err(Error::resource("inotify watcher is closed"));
        };

        if self.shared.is_watched(path) {
            return Ok(());
        }

        // notify answers registrations from the same thread that runs
        // `dispatch`, so the table lock must not be held across this call
        backend
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(path, e))?;

        let mut table = self.shared.table.write().unwrap_or_else(PoisonError::into_inner);
        table.kinds.insert(path.to_path_buf(), kinds);
        trace!(path = %path.display(), "inotify watch added");
        Ok(())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = WatchEvent> + Send + 'static>> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner).take();
        match events {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                warn!("inotify watch() called more than once, returning an empty stream");
                Box::pin(tokio_stream::empty())
            }
        }
    }

    fn close(&self) -> Result<()> {
        let backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut backend) = backend else {
            return Ok(());
        };

        let paths: Vec<PathBuf> = {
            let mut table = self.shared.table.write().unwrap_or_else(PoisonError::into_inner);
            table.kinds.drain().map(|(path, _)| path).collect()
        };
        for path in paths {
            // Already gone when the kernel dropped the watch itself
            if let Err(e) = backend.unwatch(&path) {
                trace!(path = %path.display(), "inotify unwatch failed: {}", e);
            }
        }
        drop(backend);

        // Ends the stream once buffered events are drained
        self.shared.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        debug!("inotify watcher closed");
        Ok(())
    }
}

impl Drop for InotifyWatcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn watch_error(path: &Path, err: notify::Error) -> Error {
    match &err.kind {
        notify::ErrorKind::PathNotFound => Error::not_found(path.display().to_string()),
        notify::ErrorKind::Io(e) if e.kind() == io::ErrorKind::NotFound => {
            Error::not_found(format!("{}: {}", path.display(), e))
        }
        notify::ErrorKind::MaxFilesWatch => {
            Error::resource(format!("inotify watch limit reached for {}", path.display()))
        }
        _ => Error::Io(io::Error::other(format!("{}: {}", path.display(), err))),
    }
}

/// Translate one notify event into watch events for the consumer
///
/// Runs on notify's event thread.
fn dispatch(shared: &Shared, result: notify::Result<Event>) {
    let event = match result {
        Ok(event) => event,
        Err(e) => {
            warn!("inotify backend error: {}", e);
            return;
        }
    };

    if event.need_rescan() {
        warn!("inotify queue overflowed, events dropped");
        return;
    }

    for (path, kind) in changes(&event) {
        let resolved = {
            let mut table = shared.table.write().unwrap_or_else(PoisonError::into_inner);
            let resolved = table.resolve(path, kind);

            // The kernel drops the watch of a deleted target
            if kind == ChangeKind::Removed && table.kinds.remove(path).is_some() {
                debug!(path = %path.display(), "Watched path deleted, watch pruned");
            }
            resolved
        };

        let Some(watch_event) = resolved else {
            trace!(path = %path.display(), ?kind, "Event outside the subscribed set");
            continue;
        };

        if !shared.send(watch_event) {
            trace!("Watch event consumer gone");
            return;
        }
    }
}
