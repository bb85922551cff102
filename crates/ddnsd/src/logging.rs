//! Logging setup for `ddnsd` using `tracing` + `tracing-subscriber`.
//!
//! Two layers share one level filter:
//! - human-readable lines on stdout
//! - JSON lines appended to `<data>/ddns.log`, read back by `GET /vapi/logs`
//!
//! The log file follows the `data` setting: each generation calls
//! [`LogFile::set_path`] with the directory from its settings.

use anyhow::Result;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt;

/// Log file name inside the data directory
pub const LOG_FILE_NAME: &str = "ddns.log";

/// Suffix of the rotated log file
const ROTATED_SUFFIX: &str = ".1";

/// Parse a `DDNS_LOG_LEVEL` value
pub fn parse_level(value: &str) -> Result<LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => anyhow::bail!(
            "DDNS_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            value
        ),
    }
}

/// Install the global subscriber
///
/// Safe to call once at startup.
pub fn init_tracing(level: LevelFilter, log_file: &LogFile) -> Result<()> {
    let file = log_file.clone();

    tracing_subscriber::registry()
        .with(level)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(move || file.clone()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

struct LogState {
    path: PathBuf,
    file: Option<File>,
}

impl LogState {
    fn open(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.file = Some(file);
        }
        // Populated above
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file not open"))
    }
}

/// Shared, rotatable JSON log file
///
/// The file is opened lazily on the first write. Writes that cannot reach
/// the file are dropped so logging never fails the caller.
#[derive(Clone)]
pub struct LogFile {
    state: Arc<Mutex<LogState>>,
}

impl LogFile {
    /// A log file at `<data_dir>/ddns.log`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                path: data_dir.join(LOG_FILE_NAME),
                file: None,
            })),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, LogState>> {
        self.state
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))
    }

    /// Current file path
    pub fn path(&self) -> io::Result<PathBuf> {
        Ok(self.lock()?.path.clone())
    }

    /// Follow a new data directory; a no-op when it is unchanged
    pub fn set_path(&self, data_dir: &Path) -> io::Result<()> {
        let path = data_dir.join(LOG_FILE_NAME);
        let mut state = self.lock()?;
        if state.path != path {
            state.path = path;
            state.file = None;
        }
        Ok(())
    }

    /// Move the current file to `ddns.log.1` and start a fresh one
    pub fn rotate(&self) -> io::Result<()> {
        let mut state = self.lock()?;
        state.file = None;

        let mut rotated = state.path.clone().into_os_string();
        rotated.push(ROTATED_SUFFIX);

        match std::fs::rename(&state.path, PathBuf::from(rotated)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        state.open().map(|_| ())
    }

    /// Every JSON line of the current file, skipping lines that do not parse
    pub async fn entries(&self) -> io::Result<Vec<Value>> {
        let path = self.path()?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock()?;
        if let Ok(file) = state.open() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.lock()?;
        match state.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level(" DEBUG ").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("warning").unwrap(), LevelFilter::WARN);
        assert!(parse_level("verbose").is_err());
    }

    #[tokio::test]
    async fn test_entries_skip_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = LogFile::in_dir(dir.path());

        assert!(log.entries().await.unwrap().is_empty(), "missing file reads as empty");

        log.write_all(b"{\"level\":\"INFO\",\"message\":\"one\"}\n").unwrap();
        log.write_all(b"not json\n").unwrap();
        log.write_all(b"{\"level\":\"WARN\",\"message\":\"two\"}\n").unwrap();
        log.flush().unwrap();

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["message"], "two");
    }

    #[tokio::test]
    async fn test_rotate_starts_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = LogFile::in_dir(dir.path());

        log.write_all(b"{\"message\":\"old\"}\n").unwrap();
        log.rotate().unwrap();
        log.write_all(b"{\"message\":\"new\"}\n").unwrap();

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "new");

        let rotated = std::fs::read_to_string(dir.path().join("ddns.log.1")).unwrap();
        assert!(rotated.contains("old"));
    }

    #[test]
    fn test_rotate_without_file_creates_one() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::in_dir(&dir.path().join("data"));
        log.rotate().unwrap();
        assert!(dir.path().join("data").join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn test_set_path_follows_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = LogFile::in_dir(&dir.path().join("a"));
        log.write_all(b"{}\n").unwrap();

        log.set_path(&dir.path().join("b")).unwrap();
        log.write_all(b"{}\n").unwrap();

        assert!(dir.path().join("a").join(LOG_FILE_NAME).exists());
        assert!(dir.path().join("b").join(LOG_FILE_NAME).exists());
    }
}
