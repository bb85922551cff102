//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`FileWatcher`]: Kernel file-change notifications
//! - [`GenerationRunner`]: One server generation, run until cancelled
//! - [`DnsProvider`]: Record CRUD against a provider API
//! - [`IpSource`]: Public address discovery

pub mod dns_provider;
pub mod file_watcher;
pub mod ip_source;
pub mod runner;

pub use dns_provider::{DnsProvider, DnsRecord, RecordContent};
pub use file_watcher::{ChangeKind, ChangeKinds, FileWatcher, WatchEvent};
pub use ip_source::{IpSource, PublicAddrs};
pub use runner::GenerationRunner;
