//! Per-generation cancellation context
//!
//! Each generation gets a fresh context with an empty cause slot. The slot is
//! written at most once; the first cause wins and later cancellations are
//! no-ops, so a new generation always needs a new context.

use std::fmt;
use tokio::sync::watch;

/// OS signal that requested a terminal shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// SIGTERM
    Terminate,
    /// SIGINT
    Interrupt,
    /// SIGQUIT
    Quit,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Interrupt => "SIGINT",
            TerminationSignal::Quit => "SIGQUIT",
        })
    }
}

/// Why a generation was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationCause {
    /// Terminal shutdown, no further generations
    Terminated(TerminationSignal),
    /// Watched files changed, a new generation follows
    ConfigChanged,
}

impl CancellationCause {
    /// Whether the supervisor exits after this cause
    pub fn is_terminal(&self) -> bool {
        matches!(self, CancellationCause::Terminated(_))
    }
}

impl fmt::Display for CancellationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationCause::Terminated(signal) => write!(f, "exit (signal: {})", signal),
            CancellationCause::ConfigChanged => f.write_str("config changed"),
        }
    }
}

/// Create a fresh context for generation `generation`
pub fn generation_context(generation: u64) -> (GenerationContext, Canceller) {
    let (tx, rx) = watch::channel(None);
    (GenerationContext { generation, rx }, Canceller { tx })
}

/// Read side of a generation's cancellation slot, handed to the runner
#[derive(Debug, Clone)]
pub struct GenerationContext {
    generation: u64,
    rx: watch::Receiver<Option<CancellationCause>>,
}

impl GenerationContext {
    /// Sequence number of the generation, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Cause of cancellation, `None` while still running
    pub fn cause(&self) -> Option<CancellationCause> {
        *self.rx.borrow()
    }

    /// Wait until the context is cancelled
    ///
    /// Also resolves when the owning [`Canceller`] is dropped; the cause is
    /// then `None`.
    pub async fn cancelled(&self) -> Option<CancellationCause> {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|cause| cause.is_some()).await;
        self.cause()
    }
}

/// Write side of a generation's cancellation slot, owned by the supervisor
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<Option<CancellationCause>>,
}

impl Canceller {
    /// Cancel the generation with `cause`
    ///
    /// Returns `false` when a cause was already set; the stored cause is kept.
    pub fn cancel(&self, cause: CancellationCause) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(cause);
            true
        })
    }

    /// Cause of cancellation, `None` while still running
    pub fn cause(&self) -> Option<CancellationCause> {
        *self.tx.borrow()
    }
}
