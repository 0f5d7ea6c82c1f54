//! Append-only sink that persists the live traversal as the next snapshot.
//!
//! Each record is written as one complete line as soon as it is produced, so
//! a run that stops early leaves a valid prefix snapshot behind. There is no
//! all-or-nothing guarantee for a run as a whole.
//!
//! Degradation: if the destination cannot be created, or a write fails, the
//! writer switches to discarding records. It never panics and never fails the
//! run; callers check [`SnapshotWriter::is_degraded`] and surface it.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::{self, LineWriter, Write};

use crate::core::errors::DendrError;
use crate::core::paths::SnapshotLocation;
use crate::snapshot::codec::encode_into;
use crate::snapshot::entry::FileEntry;

/// Degradation state of the snapshot writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Records reach the destination.
    Normal,
    /// Destination failed; records are dropped.
    Discard,
    /// Closed after a successful run.
    Closed,
}

/// Streaming writer for the next snapshot.
pub struct SnapshotWriter {
    sink: Option<LineWriter<Box<dyn Write>>>,
    location: String,
    state: WriterState,
    error: Option<DendrError>,
    error_reported: bool,
    records_written: u64,
    buf: String,
}

impl SnapshotWriter {
    /// Create (truncate) a snapshot file, or use stdout for [`SnapshotLocation::Stdio`].
    pub fn create(location: &SnapshotLocation) -> Self {
        let label = location.to_string();
        match location {
            SnapshotLocation::Stdio => Self::from_writer(io::stdout(), label),
            SnapshotLocation::File(path) => match create_file(path) {
                Ok(file) => Self::from_writer(file, label),
                Err(source) => Self::degraded(
                    DendrError::SnapshotOpen {
                        location: label.clone(),
                        source,
                    },
                    label,
                ),
            },
        }
    }

    /// Write records to any destination.
    pub fn from_writer<W: Write + 'static>(writer: W, label: impl Into<String>) -> Self {
        Self {
            sink: Some(LineWriter::new(Box::new(writer))),
            location: label.into(),
            state: WriterState::Normal,
            error: None,
            error_reported: false,
            records_written: 0,
            buf: String::with_capacity(256),
        }
    }

    /// A writer whose destination already failed; every write is dropped.
    pub fn degraded(error: DendrError, label: impl Into<String>) -> Self {
        Self {
            sink: None,
            location: label.into(),
            state: WriterState::Discard,
            error: Some(error),
            error_reported: false,
            records_written: 0,
            buf: String::new(),
        }
    }

    /// Encode and append one record.
    pub fn write_entry(&mut self, entry: &FileEntry) {
        if self.state != WriterState::Normal {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        self.buf.clear();
        encode_into(entry, &mut self.buf);
        match sink.write_all(self.buf.as_bytes()) {
            Ok(()) => self.records_written += 1,
            Err(source) => self.degrade(source),
        }
    }

    /// Whether records are being (or were) dropped.
    pub fn is_degraded(&self) -> bool {
        self.state == WriterState::Discard
    }

    /// The failure that degraded the writer, if any.
    pub fn error(&self) -> Option<&DendrError> {
        self.error.as_ref()
    }

    /// Hand out the degradation error the first time it is asked for.
    ///
    /// Open failures are reported once at construction; later write failures
    /// are reported once when they happen. Either way the caller sees one error.
    pub fn take_unreported_error(&mut self) -> Option<&DendrError> {
        if self.error_reported {
            return None;
        }
        if self.error.is_some() {
            self.error_reported = true;
        }
        self.error.as_ref()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Flush and release the destination, returning the number of records
    /// written. Safe to call more than once.
    pub fn finish(&mut self) -> u64 {
        if let Some(mut sink) = self.sink.take()
            && let Err(source) = sink.flush()
        {
            self.degrade(source);
            return self.records_written;
        }
        if self.state == WriterState::Normal {
            self.state = WriterState::Closed;
        }
        self.records_written
    }

    fn degrade(&mut self, source: io::Error) {
        self.sink = None;
        self.state = WriterState::Discard;
        if self.error.is_none() {
            self.error = Some(DendrError::SnapshotWrite {
                location: self.location.clone(),
                source,
            });
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("location", &self.location)
            .field("state", &self.state)
            .field("records_written", &self.records_written)
            .finish_non_exhaustive()
    }
}

fn create_file(path: &std::path::Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::codec::DecodePolicy;
    use crate::snapshot::reader::SnapshotReader;
    use chrono::{TimeZone, Utc};

    fn entry(path: &str, size: i64) -> FileEntry {
        FileEntry::new(path, size, Utc.timestamp_opt(1_600_000_000, 42).single().unwrap())
    }

    /// Destination that fails every write.
    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn written_snapshot_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let location = SnapshotLocation::File(tmp.path().join("nested").join("next.inventory"));
        let mut writer = SnapshotWriter::create(&location);
        writer.write_entry(&entry("a", 1));
        writer.write_entry(&entry("b/c", 2));
        assert_eq!(writer.finish(), 2);
        assert!(!writer.is_degraded());

        let mut reader = SnapshotReader::open(&location, DecodePolicy::Strict);
        assert_eq!(reader.read_entry().unwrap(), Some(entry("a", 1)));
        assert_eq!(reader.read_entry().unwrap(), Some(entry("b/c", 2)));
        assert_eq!(reader.read_entry().unwrap(), None);
    }

    #[test]
    fn records_are_visible_before_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("next.inventory");
        let mut writer = SnapshotWriter::create(&SnapshotLocation::File(path.clone()));
        writer.write_entry(&entry("a", 1));
        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 1);
        drop(writer);
    }

    #[test]
    fn uncreatable_destination_degrades_without_panicking() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // A path beneath a regular file cannot be created.
        let location = SnapshotLocation::File(blocker.join("next.inventory"));
        let mut writer = SnapshotWriter::create(&location);
        assert!(writer.is_degraded());
        writer.write_entry(&entry("a", 1));
        assert_eq!(writer.records_written(), 0);
        assert_eq!(writer.take_unreported_error().map(DendrError::code), Some("DDR-2001"));
        assert!(writer.take_unreported_error().is_none());
    }

    #[test]
    fn write_failure_degrades_once() {
        let mut writer = SnapshotWriter::from_writer(Broken, "broken");
        assert!(!writer.is_degraded());
        writer.write_entry(&entry("a", 1));
        writer.write_entry(&entry("b", 1));
        assert!(writer.is_degraded());
        assert_eq!(writer.records_written(), 0);
        assert_eq!(writer.error().map(DendrError::code), Some("DDR-2003"));
        assert_eq!(writer.finish(), 0);
        assert!(writer.is_degraded());
    }

    #[test]
    fn finish_is_idempotent() {
        let mut writer = SnapshotWriter::from_writer(Vec::new(), "mem");
        writer.write_entry(&entry("a", 1));
        assert_eq!(writer.finish(), 1);
        assert_eq!(writer.finish(), 1);
        assert!(!writer.is_degraded());
        writer.write_entry(&entry("b", 1));
        assert_eq!(writer.records_written(), 1);
    }
}
