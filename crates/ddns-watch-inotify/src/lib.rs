// # inotify File Watcher
//
// This crate provides the Linux `FileWatcher` used by `ddnsd` to notice
// edits of its settings and certificate files.
//
// ## Implementation
//
// - One `notify::INotifyWatcher` per watcher; its event thread forwards into
//   a bounded Tokio channel consumed as a `Stream`
// - A watched-path table behind a read-write lock, shared by `add_watch`
//   callers and the event thread, pruned when a watched target is deleted
// - notify event kinds are mapped to `ChangeKind`s in one place (`kind.rs`);
//   nothing outside this crate sees backend event types
// - Queue overflows and events the consumer cannot take are dropped; the
//   supervisor's fingerprint check makes up for them
//
// ## Platform Support
//
// Only Linux has inotify. On other targets `InotifyWatcher::open()` fails
// with `Error::Resource`, the same error a descriptor-exhausted Linux host
// produces.

#[cfg(target_os = "linux")]
mod kind;
#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::InotifyWatcher;

#[cfg(not(target_os = "linux"))]
mod unsupported;

#[cfg(not(target_os = "linux"))]
pub use unsupported::InotifyWatcher;

/// Default capacity of the event channel between the inotify thread and the
/// consumer
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
