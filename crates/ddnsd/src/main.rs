// # ddnsd - DDNS Daemon
//
// This daemon is a THIN integration layer:
// - Reconciliation, reload detection and generation supervision live in ddns-core
// - This binary wires the concrete collaborators together and owns the
//   process-level concerns (logging, signals, exit codes)
//
// The ddnsd daemon is responsible for:
// 1. Reading daemon configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Forwarding SIGTERM/SIGINT/SIGQUIT to the supervisor
// 4. Running the supervisor with the inotify watcher and the daemon runner
//
// ## Configuration
//
// Record and listener settings live in the JSON settings file, which is
// reloaded on change. The environment only selects the file and the
// process-wide behaviour:
//
// - `CONFIG`: Settings file path (default `config/config.json`)
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DDNS_MODE`: `dry-run` logs DNS changes instead of sending them
//
// ## Example
//
// ```bash
// export CONFIG=/etc/ddns/config.json
// export DDNS_LOG_LEVEL=debug
//
// ddnsd
// ```

mod http;
mod logging;
mod runner;

use anyhow::Result;
use ddns_core::{Settings, Supervisor, SupervisorEvent, SupervisorOptions, TerminationSignal};
use ddns_watch_inotify::InotifyWatcher;
use logging::LogFile;
use runner::DaemonRunner;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Process-level configuration
struct DaemonConfig {
    config_path: PathBuf,
    log_level: LevelFilter,
    dry_run: bool,
}

impl DaemonConfig {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let log_level = env::var("DDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Ok(Self {
            config_path: ddns_core::config::config_path_from_env(),
            log_level: logging::parse_level(&log_level)?,
            dry_run: ddns_provider_cloudflare::dry_run_from_env(),
        })
    }
}

fn main() -> ExitCode {
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // The log file starts in the data directory of the settings on disk and
    // follows it on every reload
    let data_dir = std::fs::read(&config.config_path)
        .ok()
        .and_then(|content| Settings::from_slice(&content).ok())
        .unwrap_or_default()
        .data;
    let log_file = LogFile::in_dir(&data_dir);

    if let Err(e) = logging::init_tracing(config.log_level, &log_file) {
        eprintln!("{}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Settings file: {}", config.config_path.display());
    if config.dry_run {
        warn!("DRY-RUN mode: DNS changes will be logged, not sent");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config, log_file)).into()
}

/// Run the supervisor until a termination signal, mapping the outcome to an
/// exit code
async fn run_daemon(config: DaemonConfig, log_file: LogFile) -> DdnsExitCode {
    let watcher = match InotifyWatcher::open() {
        Ok(watcher) => Arc::new(watcher),
        Err(e) => {
            error!("Failed to open file watcher: {}", e);
            return DdnsExitCode::RuntimeError;
        }
    };

    let signals = match forward_signals() {
        Ok(signals) => signals,
        Err(e) => {
            error!("Failed to install signal handlers: {}", e);
            return DdnsExitCode::RuntimeError;
        }
    };

    let runner = Arc::new(DaemonRunner::new(log_file));
    let (supervisor, events) = Supervisor::new(
        config.config_path,
        watcher,
        runner,
        SupervisorOptions::default(),
    );
    tokio::spawn(log_events(events));

    match supervisor.run(signals).await {
        Ok(signal) => {
            info!("Shut down after {}", signal);
            DdnsExitCode::CleanShutdown
        }
        Err(e) if e.is_not_found() => {
            error!("Settings directory cannot be watched: {}", e);
            DdnsExitCode::ConfigError
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            DdnsExitCode::RuntimeError
        }
    }
}

/// Forward SIGTERM, SIGINT and SIGQUIT into a channel for the supervisor
#[cfg(unix)]
fn forward_signals() -> Result<mpsc::Receiver<TerminationSignal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sigquit = signal(SignalKind::quit())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGQUIT handler: {}", e))?;

    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            let signal = tokio::select! {
                _ = sigterm.recv() => TerminationSignal::Terminate,
                _ = sigint.recv() => TerminationSignal::Interrupt,
                _ = sigquit.recv() => TerminationSignal::Quit,
            };
            if tx.send(signal).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Fallback for non-Unix platforms: CTRL-C only
#[cfg(not(unix))]
fn forward_signals() -> Result<mpsc::Receiver<TerminationSignal>> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(TerminationSignal::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

async fn log_events(mut events: mpsc::Receiver<SupervisorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::ReloadRejected { error, .. } => {
                warn!("Settings rejected, keeping current generation: {}", error)
            }
            SupervisorEvent::RunnerFailed { generation, error } => {
                error!(generation, "Generation failed: {}", error)
            }
            other => debug!("Supervisor event: {:?}", other),
        }
    }
}
