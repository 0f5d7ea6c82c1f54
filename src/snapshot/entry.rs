//! The per-file record carried by snapshots and the live traversal.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one regular file: its path (the key), size and modification time.
///
/// Paths order byte-wise. A snapshot is a sequence of entries in strictly
/// increasing path order; the live stream handed to the merge must be too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    /// Unique key within a snapshot.
    pub path: String,
    /// Size in bytes.
    pub size: i64,
    /// Modification time, normalized to UTC.
    pub mtime: DateTime<Utc>,
}

impl FileEntry {
    /// Build an entry from its parts.
    pub fn new(path: impl Into<String>, size: i64, mtime: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
        }
    }

    /// An entry with only its path set; size and mtime hold their zero values.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self::new(path, 0, zero_mtime())
    }

    /// Order a (possibly absent) past entry against a live path.
    ///
    /// An absent entry sorts before every path, so the caller treats the
    /// live path as new.
    pub fn compare_path(entry: Option<&Self>, path: &str) -> Ordering {
        entry.map_or(Ordering::Less, |e| e.path.as_bytes().cmp(path.as_bytes()))
    }
}

/// Zero value for a modification time: the Unix epoch.
pub const fn zero_mtime() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}
