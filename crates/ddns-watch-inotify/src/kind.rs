//! notify event kind ↔ change kind mapping

use ddns_core::traits::ChangeKind;
use notify::Event;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use std::path::Path;

/// Change kind of a delivered event, `None` for kinds nobody subscribes to
///
/// | inotify | notify | ChangeKind |
/// |---------|--------|------------|
/// | `IN_CREATE`, `IN_MOVED_TO` | `Create`, `Modify(Name(To))` | `Created` |
/// | `IN_DELETE`, `IN_DELETE_SELF` | `Remove` | `Removed` |
/// | `IN_MOVED_FROM`, `IN_MOVE_SELF` | `Modify(Name(From))` | `Renamed` |
/// | `IN_MODIFY`, `IN_CLOSE_WRITE` | `Modify(Data)`, `Access(Close(Write))` | `ModifiedContent` |
/// | `IN_ATTRIB` | `Modify(Metadata)` | `MetadataChanged` |
pub(crate) fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(ChangeKind::MetadataChanged),
        EventKind::Modify(_) => Some(ChangeKind::ModifiedContent),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            Some(ChangeKind::ModifiedContent)
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Every path an event touches with its change kind
///
/// A paired rename carries `[from, to]`: the old name is gone, the new one
/// appeared.
pub(crate) fn changes(event: &Event) -> Vec<(&Path, ChangeKind)> {
    if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        let kinds = [ChangeKind::Renamed, ChangeKind::Created];
        return event
            .paths
            .iter()
            .zip(kinds)
            .map(|(path, kind)| (path.as_path(), kind))
            .collect();
    }

    match classify(&event.kind) {
        Some(kind) => event.paths.iter().map(|path| (path.as_path(), kind)).collect(),
        None => Vec::new(),
    }
}
