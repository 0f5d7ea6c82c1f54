//! Change classification types shared by the merge and keyed comparators.

#![allow(missing_docs)]

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::entry::FileEntry;

/// How a path differs between the past snapshot and the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Unchanged,
    Added,
    Removed,
    StatsChanged,
}

impl Change {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::StatsChanged => "stats_changed",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask of the attributes that differ. Empty unless the change is `StatsChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangedStats(u8);

impl ChangedStats {
    pub const NONE: Self = Self(0);
    pub const MOD_TIME: Self = Self(1);
    pub const SIZE: Self = Self(1 << 1);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn mod_time_changed(self) -> bool {
        self.contains(Self::MOD_TIME)
    }

    pub const fn size_changed(self) -> bool {
        self.contains(Self::SIZE)
    }
}

impl BitOr for ChangedStats {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangedStats {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(2);
        if self.mod_time_changed() {
            names.push("mod_time");
        }
        if self.size_changed() {
            names.push("size");
        }
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// One classified observation handed to a collector sink.
///
/// Added, Unchanged and StatsChanged carry the live size and mtime; Removed
/// carries the values last recorded in the past snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub change: Change,
    pub stats: ChangedStats,
    pub path: String,
    pub size: i64,
    pub mtime: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn added(live: &FileEntry) -> Self {
        Self::from_entry(Change::Added, ChangedStats::NONE, live)
    }

    pub fn removed(past: FileEntry) -> Self {
        Self {
            change: Change::Removed,
            stats: ChangedStats::NONE,
            path: past.path,
            size: past.size,
            mtime: past.mtime,
        }
    }

    pub fn from_entry(change: Change, stats: ChangedStats, live: &FileEntry) -> Self {
        Self {
            change,
            stats,
            path: live.path.clone(),
            size: live.size,
            mtime: live.mtime,
        }
    }
}

/// Per-kind tallies for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub unchanged: u64,
    pub added: u64,
    pub removed: u64,
    pub stats_changed: u64,
}

impl ChangeCounts {
    pub fn record(&mut self, change: Change) {
        match change {
            Change::Unchanged => self.unchanged += 1,
            Change::Added => self.added += 1,
            Change::Removed => self.removed += 1,
            Change::StatsChanged => self.stats_changed += 1,
        }
    }

    pub const fn total(&self) -> u64 {
        self.unchanged + self.added + self.removed + self.stats_changed
    }

    /// Whether anything other than `Unchanged` was seen.
    pub const fn has_changes(&self) -> bool {
        self.added + self.removed + self.stats_changed > 0
    }
}
