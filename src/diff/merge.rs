//! Sorted-merge diff between a past snapshot and the live traversal.
//!
//! Both sequences must be strictly ascending by path (byte-wise). The
//! comparator holds exactly one lookahead past entry; it never buffers the
//! snapshot. Ordering is a caller obligation: out-of-order input yields
//! wrong classifications, not an error.

#![allow(missing_docs)]

use crate::core::errors::Result;
use crate::diff::change::{ChangeCounts, ChangeEvent};
use crate::diff::classifier::Classifier;
use crate::diff::sink::CollectorSink;
use crate::snapshot::entry::FileEntry;
use crate::snapshot::reader::SnapshotReader;
use crate::snapshot::writer::SnapshotWriter;

/// One-pass comparator over a snapshot reader and a live entry stream.
pub struct MergeComparator<'r, S: CollectorSink> {
    past: &'r mut SnapshotReader,
    next: &'r mut SnapshotWriter,
    sink: S,
    classifier: Classifier,
    /// Lookahead: the next past entry not yet matched or reported.
    cursor: Option<FileEntry>,
    counts: ChangeCounts,
}

impl<'r, S: CollectorSink> MergeComparator<'r, S> {
    /// Build the comparator and prime the cursor with the first past entry.
    pub fn new(
        past: &'r mut SnapshotReader,
        next: &'r mut SnapshotWriter,
        sink: S,
        classifier: Classifier,
    ) -> Result<Self> {
        let cursor = past.read_entry()?;
        Ok(Self {
            past,
            next,
            sink,
            classifier,
            cursor,
            counts: ChangeCounts::default(),
        })
    }

    /// Compare one live entry, then append it to the next snapshot.
    ///
    /// The live entry is written even if classification fails, so the next
    /// snapshot reflects everything that was visited.
    pub fn visit(&mut self, live: FileEntry) -> Result<()> {
        let outcome = self.classify_live(&live);
        self.next.write_entry(&live);
        outcome
    }

    /// Report every past entry never matched by a live path.
    pub fn drain(&mut self) -> Result<()> {
        while let Some(past) = self.cursor.take() {
            self.cursor = self.past.read_entry()?;
            self.emit(&ChangeEvent::removed(past))?;
        }
        Ok(())
    }

    /// Drain, then return the tallies.
    pub fn finish(mut self) -> Result<ChangeCounts> {
        self.drain()?;
        Ok(self.counts)
    }

    /// Stop without draining. Unread past entries are neither reported nor
    /// carried into the next snapshot.
    pub fn abort(self) -> ChangeCounts {
        self.counts
    }

    pub fn counts(&self) -> ChangeCounts {
        self.counts
    }

    pub fn cursor(&self) -> Option<&FileEntry> {
        self.cursor.as_ref()
    }

    pub fn writer_mut(&mut self) -> &mut SnapshotWriter {
        self.next
    }

    fn classify_live(&mut self, live: &FileEntry) -> Result<()> {
        // Past paths sorting before the live path have no live counterpart.
        while self
            .cursor
            .as_ref()
            .is_some_and(|past| past.path.as_bytes() < live.path.as_bytes())
        {
            if let Some(past) = self.advance()? {
                self.emit(&ChangeEvent::removed(past))?;
            }
        }

        match &self.cursor {
            Some(past) if past.path == live.path => {
                let (change, stats) = self.classifier.classify(past, live);
                self.advance()?;
                self.emit(&ChangeEvent::from_entry(change, stats, live))
            }
            // Cursor absent or past it: new path. The cursor stays put for a later live path.
            _ => self.emit(&ChangeEvent::added(live)),
        }
    }

    /// Replace the cursor with the next past entry, returning the old one.
    fn advance(&mut self) -> Result<Option<FileEntry>> {
        let next = self.past.read_entry()?;
        Ok(std::mem::replace(&mut self.cursor, next))
    }

    fn emit(&mut self, event: &ChangeEvent) -> Result<()> {
        self.counts.record(event.change);
        self.sink.record(event)
    }
}

/// Run a whole merge over an in-memory live sequence.
pub fn merge_diff<S, I>(
    past: &mut SnapshotReader,
    next: &mut SnapshotWriter,
    sink: S,
    classifier: Classifier,
    live: I,
) -> Result<ChangeCounts>
where
    S: CollectorSink,
    I: IntoIterator<Item = FileEntry>,
{
    let mut comparator = MergeComparator::new(past, next, sink, classifier)?;
    for entry in live {
        comparator.visit(entry)?;
    }
    comparator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::DendrError;
    use crate::diff::change::{Change, ChangedStats};
    use crate::diff::sink::VecSink;
    use crate::snapshot::codec::{DecodePolicy, SnapshotCodec};
    use chrono::{DateTime, TimeZone, Utc};
    use std::io::Cursor;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn e(path: &str, size: i64, secs: i64) -> FileEntry {
        FileEntry::new(path, size, t(secs))
    }

    fn past_reader(entries: &[FileEntry]) -> SnapshotReader {
        let codec = SnapshotCodec::default();
        let text: String = entries.iter().map(|entry| codec.encode(entry)).collect();
        SnapshotReader::from_reader(Cursor::new(text.into_bytes()), "past", DecodePolicy::Strict)
    }

    fn run(past: &[FileEntry], live: &[FileEntry]) -> (Vec<(Change, String)>, Vec<ChangeEvent>) {
        let mut reader = past_reader(past);
        let mut writer = SnapshotWriter::from_writer(std::io::sink(), "next");
        let mut sink = VecSink::new();
        merge_diff(
            &mut reader,
            &mut writer,
            &mut sink,
            Classifier::exact(),
            live.iter().cloned(),
        )
        .unwrap();
        let summary = sink
            .events
            .iter()
            .map(|ev| (ev.change, ev.path.clone()))
            .collect();
        (summary, sink.events)
    }

    #[test]
    fn interleaved_sequences_classify_in_traversal_order() {
        let past = [e("a", 1, 1), e("b", 1, 1), e("d", 1, 1)];
        let live = [e("b", 1, 1), e("c", 1, 1), e("d", 2, 1)];
        let (summary, events) = run(&past, &live);
        assert_eq!(
            summary,
            vec![
                (Change::Removed, "a".to_string()),
                (Change::Unchanged, "b".to_string()),
                (Change::Added, "c".to_string()),
                (Change::StatsChanged, "d".to_string()),
            ]
        );
        assert_eq!(events[3].stats, ChangedStats::SIZE);
        assert_eq!(events[3].size, 2);
    }

    #[test]
    fn empty_past_reports_everything_added() {
        let live = [e("a", 1, 1), e("b", 1, 1)];
        let (summary, _) = run(&[], &live);
        assert!(summary.iter().all(|(c, _)| *c == Change::Added));
        assert_eq!(summary.len(), 2);
    }

    #[test]
    fn empty_live_reports_everything_removed() {
        let past = [e("a", 1, 1), e("b", 2, 5), e("c", 1, 1)];
        let (summary, events) = run(&past, &[]);
        assert_eq!(
            summary,
            vec![
                (Change::Removed, "a".to_string()),
                (Change::Removed, "b".to_string()),
                (Change::Removed, "c".to_string()),
            ]
        );
        // Removed events carry the recorded stats.
        assert_eq!(events[1].size, 2);
        assert_eq!(events[1].mtime, t(5));
        assert!(events[1].stats.is_empty());
    }

    #[test]
    fn trailing_past_entries_drain_at_finish() {
        let past = [e("a", 1, 1), e("y", 1, 1), e("z", 1, 1)];
        let live = [e("a", 1, 1), e("b", 1, 1)];
        let (summary, _) = run(&past, &live);
        assert_eq!(
            summary,
            vec![
                (Change::Unchanged, "a".to_string()),
                (Change::Added, "b".to_string()),
                (Change::Removed, "y".to_string()),
                (Change::Removed, "z".to_string()),
            ]
        );
    }

    #[test]
    fn cursor_is_not_advanced_on_added() {
        let mut reader = past_reader(&[e("m", 1, 1)]);
        let mut writer = SnapshotWriter::from_writer(std::io::sink(), "next");
        let mut sink = VecSink::new();
        let mut cmp =
            MergeComparator::new(&mut reader, &mut writer, &mut sink, Classifier::exact()).unwrap();
        cmp.visit(e("a", 1, 1)).unwrap();
        cmp.visit(e("b", 1, 1)).unwrap();
        assert_eq!(cmp.cursor().map(|c| c.path.as_str()), Some("m"));
        cmp.visit(e("m", 1, 1)).unwrap();
        assert!(cmp.cursor().is_none());
        let counts = cmp.finish().unwrap();
        assert_eq!(counts.added, 2);
        assert_eq!(counts.unchanged, 1);
    }

    #[test]
    fn bytewise_order_puts_dot_before_slash() {
        let past = [e("a.txt", 1, 1), e("a/b", 1, 1)];
        let live = [e("a.txt", 1, 1), e("a/b", 1, 1)];
        let (summary, _) = run(&past, &live);
        assert!(summary.iter().all(|(c, _)| *c == Change::Unchanged));
    }

    #[test]
    fn every_live_entry_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("next.inventory");
        let location = crate::core::paths::SnapshotLocation::File(path.clone());
        let mut reader = past_reader(&[e("a", 1, 1), e("q", 1, 1)]);
        let mut writer = SnapshotWriter::create(&location);
        let live = vec![e("b", 1, 1), e("q", 3, 4)];
        let counts = merge_diff(
            &mut reader,
            &mut writer,
            crate::diff::sink::CountingSink::default(),
            Classifier::exact(),
            live.clone(),
        )
        .unwrap();
        writer.finish();
        assert_eq!(counts.total(), 3);

        let mut next = SnapshotReader::open(&location, DecodePolicy::Strict);
        assert_eq!(next.read_entry().unwrap(), Some(live[0].clone()));
        assert_eq!(next.read_entry().unwrap(), Some(live[1].clone()));
        assert_eq!(next.read_entry().unwrap(), None);
    }

    #[test]
    fn abort_skips_drain() {
        let mut reader = past_reader(&[e("a", 1, 1), e("b", 1, 1), e("c", 1, 1)]);
        let mut writer = SnapshotWriter::from_writer(std::io::sink(), "next");
        let mut sink = VecSink::new();
        let mut cmp =
            MergeComparator::new(&mut reader, &mut writer, &mut sink, Classifier::exact()).unwrap();
        cmp.visit(e("a", 1, 1)).unwrap();
        let counts = cmp.abort();
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.removed, 0);
        assert_eq!(sink.events.len(), 1);
    }

    struct FailingSink;

    impl CollectorSink for FailingSink {
        fn record(&mut self, _event: &ChangeEvent) -> Result<()> {
            Err(DendrError::Sink {
                details: "closed".to_string(),
            })
        }
    }

    #[test]
    fn sink_failure_still_writes_live_entry() {
        let mut reader = past_reader(&[]);
        let mut writer = SnapshotWriter::from_writer(std::io::sink(), "next");
        let mut cmp =
            MergeComparator::new(&mut reader, &mut writer, FailingSink, Classifier::exact()).unwrap();
        assert!(cmp.visit(e("a", 1, 1)).is_err());
        assert_eq!(cmp.writer_mut().records_written(), 1);
    }
}
