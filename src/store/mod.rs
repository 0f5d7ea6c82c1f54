//! Keyed store backend: random-access past state instead of a sorted snapshot.
//!
//! Each visited path is looked up and then upserted, so classification is
//! O(1) per path and traversal order does not matter. The trade-off is that
//! paths which vanished are never seen, so this backend never reports
//! `Removed`.

#![allow(missing_docs)]

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::diff::cancel::CancelToken;
use crate::diff::change::{Change, ChangeCounts, ChangeEvent};
use crate::diff::classifier::Classifier;
use crate::diff::run::{RunBuilder, RunReport};
use crate::diff::sink::CollectorSink;
use crate::logger::jsonl::JsonlWriter;
use crate::scanner::walker::WalkerConfig;
use crate::snapshot::entry::FileEntry;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Recorded attributes of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    pub size: i64,
    pub mtime: DateTime<Utc>,
}

impl From<&FileEntry> for EntryStats {
    fn from(entry: &FileEntry) -> Self {
        Self {
            size: entry.size,
            mtime: entry.mtime,
        }
    }
}

/// Persistent path → stats map.
pub trait KeyedStore {
    /// Stats recorded for `path` by an earlier `set`, if any.
    fn get(&self, path: &str) -> Result<Option<EntryStats>>;

    /// Insert or replace the stats for `path`.
    fn set(&mut self, path: &str, stats: &EntryStats) -> Result<()>;

    /// Make every `set` so far durable. Called once when a run ends, however it ends.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: KeyedStore + ?Sized> KeyedStore for &mut T {
    fn get(&self, path: &str) -> Result<Option<EntryStats>> {
        (**self).get(path)
    }

    fn set(&mut self, path: &str, stats: &EntryStats) -> Result<()> {
        (**self).set(path, stats)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}

impl<T: KeyedStore + ?Sized> KeyedStore for Box<T> {
    fn get(&self, path: &str) -> Result<Option<EntryStats>> {
        (**self).get(path)
    }

    fn set(&mut self, path: &str, stats: &EntryStats) -> Result<()> {
        (**self).set(path, stats)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}

/// Classifies live entries against a keyed store and records them.
pub struct KeyedComparator<St: KeyedStore, S: CollectorSink> {
    store: St,
    sink: S,
    classifier: Classifier,
    counts: ChangeCounts,
    records_written: u64,
}

impl<St: KeyedStore, S: CollectorSink> KeyedComparator<St, S> {
    pub fn new(store: St, sink: S, classifier: Classifier) -> Self {
        Self {
            store,
            sink,
            classifier,
            counts: ChangeCounts::default(),
            records_written: 0,
        }
    }

    /// Look up, classify, emit, then upsert the live stats.
    pub fn visit(&mut self, live: &FileEntry) -> Result<Change> {
        let event = match self.store.get(&live.path)? {
            Some(past) => {
                let past = FileEntry::new(live.path.as_str(), past.size, past.mtime);
                let (change, stats) = self.classifier.classify(&past, live);
                ChangeEvent::from_entry(change, stats, live)
            }
            None => ChangeEvent::added(live),
        };
        self.counts.record(event.change);
        let delivered = self.sink.record(&event);
        self.store.set(&live.path, &EntryStats::from(live))?;
        self.records_written += 1;
        delivered.map(|()| event.change)
    }

    pub fn counts(&self) -> ChangeCounts {
        self.counts
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Commit the store and hand back the tallies.
    pub fn finish(mut self) -> Result<ChangeCounts> {
        self.store.commit()?;
        Ok(self.counts)
    }
}

/// Walk `root` and classify every file against `store`.
///
/// Same outcome and cancellation rules as a snapshot run, minus `Removed`.
pub fn run_keyed<St, S>(
    root: &Path,
    walker: WalkerConfig,
    store: St,
    sink: S,
    classifier: Classifier,
    log: JsonlWriter,
    cancel: CancelToken,
) -> Result<RunReport>
where
    St: KeyedStore,
    S: CollectorSink,
{
    let run = RunBuilder::new()
        .store(store)
        .sink(sink)
        .classifier(classifier)
        .walker(walker)
        .log(log)
        .cancel_token(cancel)
        .build()?;
    Ok(run.run(root))
}
