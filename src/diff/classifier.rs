//! Pure comparison of one matched past/live pair.

use chrono::{DateTime, TimeDelta, Utc};

use crate::diff::change::{Change, ChangedStats};
use crate::snapshot::entry::FileEntry;

/// Compares size exactly and mtime exactly or within a tolerance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classifier {
    mtime_tolerance: TimeDelta,
}

impl Classifier {
    /// Exact comparison at nanosecond precision.
    pub fn exact() -> Self {
        Self {
            mtime_tolerance: TimeDelta::zero(),
        }
    }

    /// Treat mtimes at most `nanos` apart as equal, for filesystems that
    /// truncate timestamps.
    pub fn with_mtime_tolerance_ns(nanos: u64) -> Self {
        let nanos = i64::try_from(nanos).unwrap_or(i64::MAX);
        Self {
            mtime_tolerance: TimeDelta::nanoseconds(nanos),
        }
    }

    /// The configured tolerance window.
    pub const fn mtime_tolerance(&self) -> TimeDelta {
        self.mtime_tolerance
    }

    /// Classify a pair that shares a path.
    ///
    /// `Unchanged` when size and mtime both match, else `StatsChanged` with
    /// one bit per differing attribute.
    pub fn classify(&self, past: &FileEntry, live: &FileEntry) -> (Change, ChangedStats) {
        let mut stats = ChangedStats::NONE;
        if past.size != live.size {
            stats |= ChangedStats::SIZE;
        }
        if !self.same_mtime(&past.mtime, &live.mtime) {
            stats |= ChangedStats::MOD_TIME;
        }

        if stats.is_empty() {
            (Change::Unchanged, stats)
        } else {
            (Change::StatsChanged, stats)
        }
    }

    fn same_mtime(&self, a: &DateTime<Utc>, b: &DateTime<Utc>) -> bool {
        if self.mtime_tolerance.is_zero() {
            return a == b;
        }
        (*a - *b).abs() <= self.mtime_tolerance
    }
}
