use ddns_core::traits::{ChangeKinds, FileWatcher, WatchEvent};
use ddns_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio_stream::Stream;

/// Placeholder for targets without inotify; cannot be opened
pub struct InotifyWatcher {
    _private: (),
}

impl InotifyWatcher {
    /// Always fails: inotify is Linux-only
    pub fn open() -> Result<Self> {
        Err(Error::resource("inotify is only available on Linux"))
    }

    /// Always fails: inotify is Linux-only
    pub fn with_capacity(_capacity: usize) -> Result<Self> {
        Self::open()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

impl FileWatcher for InotifyWatcher {
    fn add_watch(&self, _path: &Path, _kinds: ChangeKinds) -> Result<()> {
        Err(Error::resource("inotify is only available on Linux"))
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = WatchEvent> + Send + 'static>> {
        Box::pin(tokio_stream::empty())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_is_a_resource_error() {
        assert!(matches!(InotifyWatcher::open(), Err(Error::Resource(_))));
    }
}
