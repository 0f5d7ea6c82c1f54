//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use dendr::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DendrError, Result};
pub use crate::core::paths::SnapshotLocation;

// Snapshots
pub use crate::snapshot::codec::{DecodePolicy, SnapshotCodec};
pub use crate::snapshot::entry::FileEntry;
pub use crate::snapshot::reader::SnapshotReader;
pub use crate::snapshot::writer::SnapshotWriter;

// Diff
pub use crate::diff::cancel::CancelToken;
pub use crate::diff::change::{Change, ChangeCounts, ChangeEvent, ChangedStats};
pub use crate::diff::classifier::Classifier;
pub use crate::diff::merge::MergeComparator;
pub use crate::diff::run::{DiffRun, RunBuilder, RunOutcome, RunReport};
pub use crate::diff::sink::{CollectorSink, CountingSink, VecSink};

// Keyed store
pub use crate::store::{EntryStats, KeyedComparator, KeyedStore, MemoryStore};
#[cfg(feature = "sqlite")]
pub use crate::store::SqliteStore;

// Scanner
pub use crate::scanner::walker::{SortedWalker, WalkItem, WalkerConfig};
