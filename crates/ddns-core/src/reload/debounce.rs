//! Event classifier and debouncer
//!
//! A single task owns the timer: accepted events push the deadline out,
//! rejected events are dropped, and the "changed" signal only goes out once
//! the quiet period passes without another accepted event.

use super::WatchedFileSet;
use crate::traits::WatchEvent;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, trace};

/// Raw event sequence produced by a `FileWatcher`
pub type WatchEventStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send + 'static>>;

/// Coalesces bursts of accepted watch events into single signals
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    quiet: Duration,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period
    pub fn new(quiet: Duration) -> Self {
        Self { quiet }
    }

    /// Spawn the debounce task
    ///
    /// Events are classified against the current value of `files`, which the
    /// supervisor replaces after each reload. The returned channel has a
    /// single slot; a signal raised while one is already pending is dropped.
    ///
    /// The task ends when `events` ends or the receiver is dropped.
    pub fn spawn(
        self,
        events: WatchEventStream,
        files: watch::Receiver<WatchedFileSet>,
    ) -> (mpsc::Receiver<()>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(self.run(events, files, tx));
        (rx, handle)
    }

    async fn run(
        self,
        mut events: WatchEventStream,
        files: watch::Receiver<WatchedFileSet>,
        tx: mpsc::Sender<()>,
    ) {
        let mut deadline: Option<Instant> = None;

        loop {
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = events.next() => {
                    let Some(event) = event else {
                        debug!("Watch event stream ended, debouncer stopping");
                        break;
                    };

                    if files.borrow().accepts(&event) {
                        trace!(
                            path = %event.path().display(),
                            kind = ?event.kind,
                            "Accepted watch event"
                        );
                        deadline = Some(Instant::now() + self.quiet);
                    } else {
                        trace!(
                            path = %event.path().display(),
                            kind = ?event.kind,
                            "Ignored watch event"
                        );
                    }
                }

                _ = timer => {
                    deadline = None;
                    match tx.try_send(()) {
                        Ok(()) => debug!("Watched files settled, change signalled"),
                        Err(mpsc::error::TrySendError::Full(())) => {
                            debug!("Change signal already pending, dropping duplicate");
                        }
                        Err(mpsc::error::TrySendError::Closed(())) => break,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChangeKind;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    struct Harness {
        events: mpsc::UnboundedSender<WatchEvent>,
        changes: mpsc::Receiver<()>,
        _files: watch::Sender<WatchedFileSet>,
    }

    fn harness(quiet: Duration) -> Harness {
        let (events, rx) = mpsc::unbounded_channel();
        let (files_tx, files_rx) =
            watch::channel(WatchedFileSet::from_paths(["/etc/ddns/config.json"]));
        let (changes, _handle) =
            Debouncer::new(quiet).spawn(Box::pin(UnboundedReceiverStream::new(rx)), files_rx);
        Harness {
            events,
            changes,
            _files: files_tx,
        }
    }

    fn config_write() -> WatchEvent {
        WatchEvent::new("/etc/ddns", "config.json", ChangeKind::ModifiedContent)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_one_signal() {
        let mut h = harness(Duration::from_millis(200));

        for _ in 0..5 {
            h.events.send(config_write()).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let last_event = Instant::now();

        h.changes.recv().await.unwrap();
        assert!(last_event.elapsed() >= Duration::from_millis(190));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_paths_are_ignored() {
        let mut h = harness(Duration::from_millis(100));

        h.events
            .send(WatchEvent::new("/etc/ddns", "config.json~", ChangeKind::Created))
            .unwrap();
        h.events
            .send(WatchEvent::new("/etc/ddns", "notes.txt", ChangeKind::ModifiedContent))
            .unwrap();

        let waited = tokio::time::timeout(Duration::from_secs(1), h.changes.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_windows_signal_separately() {
        let mut h = harness(Duration::from_millis(100));

        h.events.send(config_write()).unwrap();
        h.changes.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        h.events.send(config_write()).unwrap();
        h.changes.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pending_signal_absorbs_duplicates() {
        let mut h = harness(Duration::from_millis(100));

        h.events.send(config_write()).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.events.send(config_write()).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(h.changes.try_recv().is_ok());
        assert!(h.changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn file_set_updates_apply_to_later_events() {
        let (events, rx) = mpsc::unbounded_channel();
        let (files_tx, files_rx) =
            watch::channel(WatchedFileSet::from_paths(["/etc/ddns/config.json"]));
        let (mut changes, _handle) = Debouncer::new(Duration::from_millis(100))
            .spawn(Box::pin(UnboundedReceiverStream::new(rx)), files_rx);

        let cert = WatchEvent::new("/etc/ddns/tls", "cert.pem", ChangeKind::Created);
        events.send(cert.clone()).unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), changes.recv()).await.is_err());

        files_tx.send_replace(WatchedFileSet::from_paths([
            "/etc/ddns/config.json",
            "/etc/ddns/tls/cert.pem",
        ]));
        events.send(cert).unwrap();
        changes.recv().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_stream_ends() {
        let (events, rx) = mpsc::unbounded_channel::<WatchEvent>();
        let (_files_tx, files_rx) = watch::channel(WatchedFileSet::default());
        let (_changes, handle) = Debouncer::new(Duration::from_millis(100))
            .spawn(Box::pin(UnboundedReceiverStream::new(rx)), files_rx);

        drop(events);
        handle.await.unwrap();
    }
}
