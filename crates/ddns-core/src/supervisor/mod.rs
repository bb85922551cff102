//! Generation supervisor
//!
//! The supervisor owns the current generation and is the only code that
//! starts or cancels one. Everything that can cause a transition arrives
//! through a channel and is handled from a single `select!`:
//!
//! ```text
//!            ┌──────────── termination signal ─────────────┐
//!            ▼                                             │
//!  Idle ─▶ Running ── changed + new fingerprint ─▶ Draining ┴─▶ exit
//!            ▲                                        │
//!            └──────── runner returned, restart ──────┘
//! ```
//!
//! ## Guarantees
//!
//! - At most one generation is running at any instant; the next one starts
//!   only after the previous runner has returned
//! - Once a termination signal is observed no new generation starts
//! - A change whose fingerprint matches the running one never restarts
//!
//! ## Reload failures
//!
//! - Fingerprint read failure: deferred, evaluated again on the next trigger
//! - Settings parse failure: rejected, the new fingerprint is recorded so the
//!   same broken content does not keep retriggering; the running generation
//!   keeps its settings

mod context;

pub use context::{
    CancellationCause, Canceller, GenerationContext, TerminationSignal, generation_context,
};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::reload::{ContentFingerprint, Debouncer, WatchedFileSet, fingerprint};
use crate::traits::{ChangeKinds, FileWatcher, GenerationRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Supervisor tunables
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Quiet period before a burst of file events counts as one change
    pub quiet_period: Duration,

    /// Pause between a drained generation and the next one
    pub restart_delay: Duration,

    /// Capacity of the supervisor event channel
    pub event_channel_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(150),
            restart_delay: Duration::from_secs(1),
            event_channel_capacity: 64,
        }
    }
}

/// Events emitted by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A generation was started
    GenerationStarted {
        generation: u64,
        fingerprint: Option<ContentFingerprint>,
    },

    /// A generation's runner returned
    GenerationStopped {
        generation: u64,
        cause: Option<CancellationCause>,
    },

    /// A runner failed for a reason other than cancellation
    RunnerFailed {
        generation: u64,
        error: String,
    },

    /// Change signal with unchanged content
    ChangeIgnored {
        fingerprint: ContentFingerprint,
    },

    /// New content could not be parsed; running settings kept
    ReloadRejected {
        fingerprint: ContentFingerprint,
        error: String,
    },

    /// Files could not be read; evaluated again on the next change
    ReloadDeferred {
        error: String,
    },

    /// Supervisor stopped after a termination signal
    Stopped {
        signal: TerminationSignal,
    },
}

struct ActiveGeneration {
    id: u64,
    canceller: Canceller,
    handle: JoinHandle<Result<()>>,
}

/// Settings, file set and fingerprint accepted for the next generation
struct Reload {
    settings: Settings,
    files: WatchedFileSet,
    fingerprint: ContentFingerprint,
}

/// Hot-reload supervisor
///
/// ## Lifecycle
///
/// 1. Create with [`Supervisor::new()`]
/// 2. Forward OS signals into the channel given to [`Supervisor::run()`]
/// 3. `run` returns the signal that stopped it, after the last generation
///    has returned and the watcher is closed
pub struct Supervisor<W, R> {
    config_path: PathBuf,
    watcher: Arc<W>,
    runner: Arc<R>,
    options: SupervisorOptions,
    event_tx: mpsc::Sender<SupervisorEvent>,
}

impl<W: FileWatcher, R: GenerationRunner> Supervisor<W, R> {
    /// Create a new supervisor
    ///
    /// # Returns
    ///
    /// A tuple of (supervisor, event_receiver)
    pub fn new(
        config_path: impl Into<PathBuf>,
        watcher: Arc<W>,
        runner: Arc<R>,
        options: SupervisorOptions,
    ) -> (Self, mpsc::Receiver<SupervisorEvent>) {
        let (event_tx, event_rx) = mpsc::channel(options.event_channel_capacity.max(1));

        let supervisor = Self {
            config_path: config_path.into(),
            watcher,
            runner,
            options,
            event_tx,
        };

        (supervisor, event_rx)
    }

    /// Run generations until a termination signal arrives
    ///
    /// # Returns
    ///
    /// - `Ok(signal)`: Clean shutdown after `signal`
    /// - `Err(Error::NotFound)`: The settings directory cannot be watched
    /// - `Err(Error::Resource)`: The watcher refused the watch registration
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<TerminationSignal>,
    ) -> Result<TerminationSignal> {
        let mut settings = Arc::new(self.load_initial_settings().await);
        let mut files = WatchedFileSet::from_settings(&self.config_path, &settings);
        self.register_watches(&files, true)?;

        let mut last_fingerprint = match fingerprint(files.paths()).await {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!("Initial fingerprint unavailable, first change will reload: {}", e);
                None
            }
        };

        let (files_tx, files_rx) = watch::channel(files.clone());
        let (mut changes, debouncer) =
            Debouncer::new(self.options.quiet_period).spawn(self.watcher.watch(), files_rx);

        let mut generation_id = 1;
        let mut active =
            Some(self.start_generation(generation_id, Arc::clone(&settings), last_fingerprint));

        let signal = 'supervise: loop {
            tokio::select! {
                biased;

                Some(signal) = signals.recv() => {
                    info!("Received {}, shutting down", signal);
                    break 'supervise signal;
                }

                Some(()) = changes.recv() => {
                    let reload = self.evaluate_change(&files, &mut last_fingerprint).await;
                    let Some(reload) = reload else {
                        continue;
                    };

                    let mut pending_signal = None;
                    if let Some(current) = active.take() {
                        info!(
                            generation = current.id,
                            "Watched files changed, restarting generation"
                        );
                        current.canceller.cancel(CancellationCause::ConfigChanged);
                        pending_signal = self.drain(current, &mut signals).await;
                    }
                    if pending_signal.is_none() {
                        pending_signal = self.restart_delay(&mut signals).await;
                    }
                    if let Some(signal) = pending_signal {
                        break 'supervise signal;
                    }

                    settings = Arc::new(reload.settings);
                    if reload.files != files {
                        debug!(paths = ?reload.files.paths(), "Watched file set updated");
                        files = reload.files;
                        files_tx.send_replace(files.clone());
                    }
                    // Directories missing at an earlier registration may exist now
                    if let Err(e) = self.register_watches(&files, false) {
                        warn!("Failed to watch updated file set: {}", e);
                    }
                    last_fingerprint = Some(reload.fingerprint);

                    generation_id += 1;
                    active = Some(self.start_generation(
                        generation_id,
                        Arc::clone(&settings),
                        last_fingerprint,
                    ));
                }

                (id, result) = join_active(&mut active) => {
                    // Runner returned without being cancelled
                    active = None;
                    self.report_exit(id, None, result);
                    warn!(
                        generation = id,
                        "Generation ended on its own, waiting for the next change"
                    );
                }
            }
        };

        if let Some(current) = active.take() {
            current.canceller.cancel(CancellationCause::Terminated(signal));
            let cause = current.canceller.cause();
            let id = current.id;
            let result = current.handle.await;
            self.report_exit(id, cause, result);
        }

        if let Err(e) = self.watcher.close() {
            warn!("Failed to close file watcher: {}", e);
        }
        debouncer.abort();

        info!("Supervisor stopped ({})", signal);
        self.emit(SupervisorEvent::Stopped { signal });
        Ok(signal)
    }

    async fn load_initial_settings(&self) -> Settings {
        match Settings::load(&self.config_path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, starting with defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Register watches on the directories of `files`
    ///
    /// A missing settings directory is fatal when `strict`; missing
    /// certificate directories only warn.
    fn register_watches(&self, files: &WatchedFileSet, strict: bool) -> Result<()> {
        let config_dir = files
            .paths()
            .first()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf);

        for dir in files.directories() {
            match self.watcher.add_watch(&dir, ChangeKinds::CONTENT) {
                Ok(()) => debug!(dir = %dir.display(), "Watching directory"),
                Err(e) if e.is_not_found() && Some(&dir) != config_dir.as_ref() => {
                    warn!(dir = %dir.display(), "Directory does not exist, not watched: {}", e);
                }
                Err(e) if strict => return Err(e),
                Err(e) if e.is_fatal() => {
                    error!(
                        dir = %dir.display(),
                        "Watch descriptors exhausted, changes here go unnoticed: {}",
                        e
                    )
                }
                Err(e) => warn!(dir = %dir.display(), "Failed to watch directory: {}", e),
            }
        }
        Ok(())
    }

    /// Decide whether a debounced change warrants a new generation
    async fn evaluate_change(
        &self,
        files: &WatchedFileSet,
        last_fingerprint: &mut Option<ContentFingerprint>,
    ) -> Option<Reload> {
        let current = match fingerprint(files.paths()).await {
            Ok(fp) => fp,
            Err(e) => {
                warn!("Reload deferred: {}", e);
                self.emit(SupervisorEvent::ReloadDeferred { error: e.to_string() });
                return None;
            }
        };

        if *last_fingerprint == Some(current) {
            debug!(fingerprint = %current, "Content unchanged, ignoring change");
            self.emit(SupervisorEvent::ChangeIgnored { fingerprint: current });
            return None;
        }

        let settings = match Settings::load(&self.config_path).await {
            Ok(settings) => settings,
            Err(e @ Error::TransientIo(_)) => {
                warn!("Reload deferred: {}", e);
                self.emit(SupervisorEvent::ReloadDeferred { error: e.to_string() });
                return None;
            }
            Err(e) => {
                warn!("Reload rejected, keeping running settings: {}", e);
                *last_fingerprint = Some(current);
                self.emit(SupervisorEvent::ReloadRejected {
                    fingerprint: current,
                    error: e.to_string(),
                });
                return None;
            }
        };

        let next_files = WatchedFileSet::from_settings(&self.config_path, &settings);
        let next_fingerprint = if next_files == *files {
            current
        } else {
            match fingerprint(next_files.paths()).await {
                Ok(fp) => fp,
                Err(e) => {
                    warn!("Reload deferred: {}", e);
                    self.emit(SupervisorEvent::ReloadDeferred { error: e.to_string() });
                    return None;
                }
            }
        };

        Some(Reload {
            settings,
            files: next_files,
            fingerprint: next_fingerprint,
        })
    }

    fn start_generation(
        &self,
        id: u64,
        settings: Arc<Settings>,
        fingerprint: Option<ContentFingerprint>,
    ) -> ActiveGeneration {
        let (ctx, canceller) = generation_context(id);
        let runner = Arc::clone(&self.runner);
        let handle = tokio::spawn(async move { runner.run(ctx, settings).await });

        info!(generation = id, "Generation started");
        self.emit(SupervisorEvent::GenerationStarted {
            generation: id,
            fingerprint,
        });

        ActiveGeneration {
            id,
            canceller,
            handle,
        }
    }

    /// Wait for a cancelled generation to return
    ///
    /// Returns a termination signal observed while waiting. The generation's
    /// cause is not changed by it.
    async fn drain(
        &self,
        mut generation: ActiveGeneration,
        signals: &mut mpsc::Receiver<TerminationSignal>,
    ) -> Option<TerminationSignal> {
        let mut pending = None;
        let result = loop {
            tokio::select! {
                biased;

                Some(signal) = signals.recv(), if pending.is_none() => {
                    info!(
                        generation = generation.id,
                        "Received {} while draining, exiting afterwards",
                        signal
                    );
                    pending = Some(signal);
                }

                result = &mut generation.handle => break result,
            }
        };

        self.report_exit(generation.id, generation.canceller.cause(), result);
        pending
    }

    async fn restart_delay(
        &self,
        signals: &mut mpsc::Receiver<TerminationSignal>,
    ) -> Option<TerminationSignal> {
        tokio::select! {
            biased;

            Some(signal) = signals.recv() => {
                info!("Received {} before restart, exiting", signal);
                Some(signal)
            }

            _ = tokio::time::sleep(self.options.restart_delay) => None,
        }
    }

    fn report_exit(
        &self,
        id: u64,
        cause: Option<CancellationCause>,
        result: std::result::Result<Result<()>, JoinError>,
    ) {
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some("generation runner panicked".to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(error) = failure {
            error!(generation = id, "Generation runner failed: {}", error);
            self.emit(SupervisorEvent::RunnerFailed { generation: id, error });
        }

        match cause {
            Some(cause) => info!(generation = id, "Generation stopped: {}", cause),
            None => info!(generation = id, "Generation stopped"),
        }
        self.emit(SupervisorEvent::GenerationStopped { generation: id, cause });
    }

    /// Emit a supervisor event
    fn emit(&self, event: SupervisorEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!(
                "Supervisor event channel full, dropping event. \
                 Consider increasing event_channel_capacity."
            );
        }
    }
}

/// Wait for the active generation's runner, forever when there is none
async fn join_active(
    active: &mut Option<ActiveGeneration>,
) -> (u64, std::result::Result<Result<()>, JoinError>) {
    match active {
        Some(generation) => (generation.id, (&mut generation.handle).await),
        None => std::future::pending().await,
    }
}
