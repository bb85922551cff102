//! Reload pipeline
//!
//! ```text
//! FileWatcher ── WatchEvent ──▶ Debouncer ── () ──▶ Supervisor
//!                                  ▲                    │
//!                                  └── WatchedFileSet ──┘
//! ```
//!
//! - [`WatchedFileSet`]: which paths matter (classification)
//! - [`Debouncer`]: burst coalescing after a quiet period
//! - [`fingerprint`]: content digest used to reject spurious triggers

mod debounce;
mod fileset;
mod fingerprint;

pub use debounce::{Debouncer, WatchEventStream};
pub use fileset::WatchedFileSet;
pub use fingerprint::{ContentFingerprint, fingerprint};
