// # File Watcher Trait
//
// Defines the interface for kernel file-change notifications.
//
// ## Implementations
//
// - inotify (Linux): `ddns-watch-inotify` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::{ChangeKinds, FileWatcher};
// use tokio_stream::StreamExt;
//
// let watcher = /* FileWatcher implementation */;
// watcher.add_watch(Path::new("/etc/ddns"), ChangeKinds::CONTENT)?;
//
// let mut events = watcher.watch();
// while let Some(event) = events.next().await {
//     println!("{} changed: {:?}", event.path().display(), event.kind);
// }
// ```

use std::ffi::OsString;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_stream::Stream;

/// Semantic change kind, independent of the kernel's notification mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Entry created (or moved into the watched directory)
    Created,
    /// Entry deleted
    Removed,
    /// Entry moved away
    Renamed,
    /// File content written
    ModifiedContent,
    /// Permissions, ownership or timestamps changed
    MetadataChanged,
}

impl ChangeKind {
    /// Every change kind, in classification priority order
    pub const ALL: [ChangeKind; 5] = [
        ChangeKind::Created,
        ChangeKind::Removed,
        ChangeKind::Renamed,
        ChangeKind::ModifiedContent,
        ChangeKind::MetadataChanged,
    ];

    fn bit(self) -> u8 {
        match self {
            ChangeKind::Created => 1 << 0,
            ChangeKind::Removed => 1 << 1,
            ChangeKind::Renamed => 1 << 2,
            ChangeKind::ModifiedContent => 1 << 3,
            ChangeKind::MetadataChanged => 1 << 4,
        }
    }
}

/// Set of change kinds a watch is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeKinds(u8);

impl ChangeKinds {
    /// Empty set
    pub const NONE: ChangeKinds = ChangeKinds(0);

    /// Everything that can alter what a reader of the file sees
    pub const CONTENT: ChangeKinds = ChangeKinds(0b0_1111);

    /// Every change kind
    pub const ALL: ChangeKinds = ChangeKinds(0b1_1111);

    /// Whether `kind` is in the set
    pub fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Iterate over the kinds in the set
    pub fn iter(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl From<ChangeKind> for ChangeKinds {
    fn from(kind: ChangeKind) -> Self {
        ChangeKinds(kind.bit())
    }
}

impl BitOr for ChangeKinds {
    type Output = ChangeKinds;

    fn bitor(self, rhs: ChangeKinds) -> ChangeKinds {
        ChangeKinds(self.0 | rhs.0)
    }
}

impl BitOr<ChangeKind> for ChangeKinds {
    type Output = ChangeKinds;

    fn bitor(self, rhs: ChangeKind) -> ChangeKinds {
        self | ChangeKinds::from(rhs)
    }
}

impl BitOr for ChangeKind {
    type Output = ChangeKinds;

    fn bitor(self, rhs: ChangeKind) -> ChangeKinds {
        ChangeKinds::from(self) | rhs
    }
}

/// A single file-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The watched path the notification was raised on
    pub dir: PathBuf,
    /// Entry name inside `dir`; empty when the event concerns `dir` itself
    pub name: OsString,
    /// What happened
    pub kind: ChangeKind,
}

impl WatchEvent {
    /// Create a new watch event
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<OsString>, kind: ChangeKind) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            kind,
        }
    }

    /// Full path the event refers to
    pub fn path(&self) -> PathBuf {
        if self.name.is_empty() {
            self.dir.clone()
        } else {
            self.dir.join(&self.name)
        }
    }
}

/// Trait for file watcher implementations
///
/// # Trust Level: Semi-Trusted
///
/// Watchers perform platform-specific I/O but make no decisions:
///
/// ## Allowed Capabilities
/// - ✅ Own a kernel notification handle and its watched-path table
/// - ✅ Run ONE reader, blocked on the kernel read, feeding the `watch()` stream
/// - ✅ Drop notifications when the consumer lags or the kernel queue overflows
///
/// ## Forbidden Capabilities
/// - ❌ Filter events by significance (owned by the classifier)
/// - ❌ Debounce (owned by the debouncer)
/// - ❌ Decide whether a reload is needed (owned by the supervisor)
///
/// Dropped notifications are recovered by the content fingerprint check
/// downstream, never by the watcher.
pub trait FileWatcher: Send + Sync + 'static {
    /// Register interest in `path` for the given change kinds
    ///
    /// Idempotent per path: re-adding an already-watched path is a no-op.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Path is watched
    /// - `Err(Error::NotFound)`: Path does not exist
    fn add_watch(&self, path: &Path, kinds: ChangeKinds) -> Result<(), crate::Error>;

    /// Live sequence of change events
    ///
    /// The sequence runs until [`FileWatcher::close`] is called, then ends
    /// silently. It is not restartable.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = WatchEvent> + Send + 'static>>;

    /// Remove all watches and release the handle
    fn close(&self) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_path_joins_name() {
        let event = WatchEvent::new("/etc/ddns", "config.json", ChangeKind::ModifiedContent);
        assert_eq!(event.path(), PathBuf::from("/etc/ddns/config.json"));

        let event = WatchEvent::new("/etc/ddns/config.json", "", ChangeKind::Removed);
        assert_eq!(event.path(), PathBuf::from("/etc/ddns/config.json"));
    }

    #[test]
    fn content_kinds_exclude_metadata() {
        assert!(ChangeKinds::CONTENT.contains(ChangeKind::ModifiedContent));
        assert!(ChangeKinds::CONTENT.contains(ChangeKind::Renamed));
        assert!(!ChangeKinds::CONTENT.contains(ChangeKind::MetadataChanged));
        assert_eq!(ChangeKinds::ALL.iter().count(), 5);
    }

    #[test]
    fn kinds_combine() {
        let kinds = ChangeKind::Created | ChangeKind::Removed;
        assert!(kinds.contains(ChangeKind::Created));
        assert!(kinds.contains(ChangeKind::Removed));
        assert!(!kinds.contains(ChangeKind::Renamed));
        assert_eq!((kinds | ChangeKind::Renamed).iter().count(), 3);
    }
}
