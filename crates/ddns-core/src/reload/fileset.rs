//! The set of files whose content defines a generation

use crate::config::Settings;
use crate::traits::WatchEvent;
use std::path::{Path, PathBuf};

/// Ordered, de-duplicated set of absolute paths the supervisor cares about
///
/// Order is: settings file, TLS certificate, TLS key. The order is part of
/// the fingerprint, so it must stay stable for a given configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchedFileSet {
    paths: Vec<PathBuf>,
}

impl WatchedFileSet {
    /// Build the set for the settings loaded from `config_path`
    pub fn from_settings(config_path: &Path, settings: &Settings) -> Self {
        let mut set = Self::default();
        set.insert(config_path);
        for path in [&settings.tls_cert, &settings.tls_key] {
            if !path.is_empty() {
                set.insert(Path::new(path));
            }
        }
        set
    }

    /// Build a set from explicit paths
    pub fn from_paths<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Self {
        let mut set = Self::default();
        for path in paths {
            set.insert(path.as_ref());
        }
        set
    }

    fn insert(&mut self, path: &Path) {
        let path = absolutize(path);
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Paths in fingerprint order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether `path` is significant
    pub(crate) fn contains(&self, path: &Path) -> bool {
        let path = absolutize(path);
        self.paths.iter().any(|p| *p == path)
    }

    /// Whether a raw watch event concerns one of the significant files
    pub fn accepts(&self, event: &WatchEvent) -> bool {
        self.contains(&event.path())
    }

    /// Directories to watch, one per distinct parent
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for path in &self.paths {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

/// Absolute, lexically-cleaned form of `path`
///
/// Falls back to the cleaned relative path when the working directory is
/// unavailable.
fn absolutize(path: &Path) -> PathBuf {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
