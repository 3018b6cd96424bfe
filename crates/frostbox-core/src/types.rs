use chrono::{DateTime, Utc};

use crate::error::FbResult;

/// Normalized archival lifecycle state of a stored object.
///
/// Derived by best-effort text matching over backend-reported storage class
/// and restore headers. Advisory only: it never gates a security decision,
/// so unparseable input degrades to `Unknown` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    /// Backend did not report enough to tell.
    Unknown,
    /// In cold storage; must be recalled before download.
    Archived,
    /// Recall in progress.
    Recovering,
    /// Restored and downloadable.
    Ready,
}

impl RestoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStatus::Unknown => "UNKNOWN",
            RestoreStatus::Archived => "ARCHIVED",
            RestoreStatus::Recovering => "RECOVERING",
            RestoreStatus::Ready => "READY",
        }
    }
}

impl std::fmt::Display for RestoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw head/list result for one remote object, as reported by the storage
/// collaborator. Storage class and restore text are opaque backend strings;
/// `None` when the backend does not expose them.
#[derive(Debug, Clone)]
pub struct RemoteObjectInfo {
    /// Remote object key (the storage-safe encoded name).
    pub key: String,
    /// Content-Length in bytes.
    pub size: u64,
    /// Last-Modified timestamp.
    pub last_modified: Option<DateTime<Utc>>,
    /// Content-Type as stored.
    pub content_type: Option<String>,
    /// Backend storage tier string (e.g. "DEEP_ARCHIVE").
    pub storage_class: Option<String>,
    /// Backend restore header text (e.g. `ongoing-request="false"`).
    pub restore: Option<String>,
    /// Per-object nonce from user metadata, lowercase hex.
    pub nonce_hex: Option<String>,
}

/// Positional byte sink driven by the download transfer loop.
///
/// The transfer client is pinned to a single download stream, so offsets
/// arrive in increasing, contiguous, non-overlapping order starting at
/// zero. Implementations may rely on that ordering; they are not required
/// to re-verify it on every call.
pub trait RangeSink {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> FbResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_status_display() {
        assert_eq!(RestoreStatus::Unknown.to_string(), "UNKNOWN");
        assert_eq!(RestoreStatus::Archived.to_string(), "ARCHIVED");
        assert_eq!(RestoreStatus::Recovering.to_string(), "RECOVERING");
        assert_eq!(RestoreStatus::Ready.to_string(), "READY");
    }
}
