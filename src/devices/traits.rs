use crate::readings::{Reading, ReadingKind};

/// Non-blocking access to the most recent decoded reading per kind.
///
/// `None` means no well-formed reading of that kind has been seen yet; the
/// consumer treats that as "not ready", never as an error. A returned
/// snapshot may be stale, last write wins.
pub trait ReadingSource: Send + Sync {
    fn latest(&self, kind: ReadingKind) -> Option<Reading>;
}
