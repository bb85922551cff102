// # ddns-core
//
// Core library for the hot-reloading DDNS daemon.
//
// ## Architecture Overview
//
// - **FileWatcher**: Trait for kernel file-change notifications
// - **reload**: Classification, debouncing and content fingerprinting of
//   the watched settings/certificate files
// - **Supervisor**: Single-owner loop running one generation at a time and
//   restarting it when the watched content really changed
// - **GenerationRunner**: Trait for the payload of one generation
// - **IpSource / DnsProvider**: Traits for address discovery and record
//   management
// - **Reconciler**: Diffs desired records against the zone and applies the
//   difference
//
// ## Design Principles
//
// 1. **Single Owner**: Only the supervisor loop starts or cancels generations
// 2. **One-Shot Cancellation**: A generation's cause is set once, never reset
// 3. **Content Over Events**: File events only *suggest* a change; the
//    fingerprint decides
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod engine;
pub mod error;
pub mod reload;
pub mod supervisor;
pub mod traits;

// Re-export core types for convenience
pub use config::{RecordConfig, RecordType, Settings};
pub use engine::{ReconcileReport, Reconciler};
pub use error::{Error, Result};
pub use reload::{ContentFingerprint, Debouncer, WatchedFileSet};
pub use supervisor::{
    CancellationCause, GenerationContext, Supervisor, SupervisorEvent, SupervisorOptions,
    TerminationSignal,
};
pub use traits::{DnsProvider, FileWatcher, GenerationRunner, IpSource};
