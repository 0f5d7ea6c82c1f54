//! Sequential pull source over a persisted snapshot.
//!
//! The reader never rewinds. Failing to open the snapshot is not fatal: the
//! failure is kept for the caller to report once, and the reader behaves as
//! an already-drained source, so every live path will classify as added.

#![allow(missing_docs)]

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

use crate::core::errors::{DendrError, Result};
use crate::core::paths::SnapshotLocation;
use crate::snapshot::codec::{DecodePolicy, SnapshotCodec};
use crate::snapshot::entry::FileEntry;

/// Lazy, forward-only reader of snapshot records.
pub struct SnapshotReader {
    source: Option<Box<dyn BufRead>>,
    location: String,
    codec: SnapshotCodec,
    open_error: Option<DendrError>,
    line: Vec<u8>,
    line_no: u64,
    entries_read: u64,
    field_errors: u64,
}

impl SnapshotReader {
    /// Open a snapshot file, or stdin for [`SnapshotLocation::Stdio`].
    pub fn open(location: &SnapshotLocation, policy: DecodePolicy) -> Self {
        let label = location.to_string();
        match location {
            SnapshotLocation::Stdio => Self::from_reader(io::stdin().lock(), label, policy),
            SnapshotLocation::File(path) => match File::open(path) {
                Ok(file) => Self::from_reader(BufReader::new(file), label, policy),
                Err(source) => Self::unavailable(
                    DendrError::SnapshotOpen {
                        location: label.clone(),
                        source,
                    },
                    label,
                    policy,
                ),
            },
        }
    }

    /// Read records from any buffered source.
    pub fn from_reader<R: BufRead + 'static>(
        reader: R,
        label: impl Into<String>,
        policy: DecodePolicy,
    ) -> Self {
        Self {
            source: Some(Box::new(reader)),
            location: label.into(),
            codec: SnapshotCodec::new(policy),
            open_error: None,
            line: Vec::with_capacity(256),
            line_no: 0,
            entries_read: 0,
            field_errors: 0,
        }
    }

    /// A reader that is exhausted from the start and remembers why.
    pub fn unavailable(error: DendrError, label: impl Into<String>, policy: DecodePolicy) -> Self {
        Self {
            source: None,
            location: label.into(),
            codec: SnapshotCodec::new(policy),
            open_error: Some(error),
            line: Vec::new(),
            line_no: 0,
            entries_read: 0,
            field_errors: 0,
        }
    }

    /// Next record, or `Ok(None)` once the source is drained.
    ///
    /// Blank lines are skipped. Read failures, and malformed records under the
    /// strict policy, are returned as errors.
    pub fn read_entry(&mut self) -> Result<Option<FileEntry>> {
        loop {
            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };

            self.line.clear();
            let n = source
                .read_until(b'\n', &mut self.line)
                .map_err(|source| DendrError::Io {
                    path: self.location.clone().into(),
                    source,
                })?;
            if n == 0 {
                // Drained: release the handle now rather than at end of run.
                self.source = None;
                return Ok(None);
            }
            self.line_no += 1;

            let mut raw: &[u8] = &self.line;
            while let Some((&last, rest)) = raw.split_last() {
                if last == b'\n' || last == b'\r' {
                    raw = rest;
                } else {
                    break;
                }
            }
            if raw.is_empty() {
                continue;
            }

            let text = match std::str::from_utf8(raw) {
                Ok(text) => Cow::Borrowed(text),
                Err(err) => match self.codec.policy() {
                    DecodePolicy::Strict => {
                        return Err(DendrError::SnapshotDecode {
                            line: self.line_no,
                            details: format!("record is not UTF-8: {err}"),
                        });
                    }
                    DecodePolicy::Lenient => {
                        self.field_errors += 1;
                        String::from_utf8_lossy(raw)
                    }
                },
            };

            let decoded = self.codec.decode(&text, self.line_no)?;
            self.field_errors += u64::from(decoded.field_errors);
            self.entries_read += 1;
            return Ok(Some(decoded.entry));
        }
    }

    /// The open failure, if the snapshot could not be opened.
    pub fn open_error(&self) -> Option<&DendrError> {
        self.open_error.as_ref()
    }

    /// Take ownership of the open failure so it is reported exactly once.
    pub fn take_open_error(&mut self) -> Option<DendrError> {
        self.open_error.take()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn entries_read(&self) -> u64 {
        self.entries_read
    }

    /// Fields recovered to zero values under the lenient policy.
    pub fn field_errors(&self) -> u64 {
        self.field_errors
    }

    /// Release the underlying handle. Further reads report exhaustion.
    pub fn close(&mut self) {
        self.source = None;
    }
}

impl std::fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("location", &self.location)
            .field("open", &self.source.is_some())
            .field("line_no", &self.line_no)
            .field("entries_read", &self.entries_read)
            .field("field_errors", &self.field_errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn reader_over(text: &str, policy: DecodePolicy) -> SnapshotReader {
        SnapshotReader::from_reader(Cursor::new(text.as_bytes().to_vec()), "mem", policy)
    }

    fn paths(reader: &mut SnapshotReader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(entry) = reader.read_entry().unwrap() {
            out.push(entry.path);
        }
        out
    }

    #[test]
    fn reads_records_in_file_order_then_stays_exhausted() {
        let mut reader = reader_over(
            "a\ts1\tt1970-01-01T00:00:00Z\nb\ts2\tt1970-01-01T00:00:00Z\n",
            DecodePolicy::Lenient,
        );
        assert_eq!(paths(&mut reader), vec!["a", "b"]);
        assert!(reader.read_entry().unwrap().is_none());
        assert!(reader.read_entry().unwrap().is_none());
        assert_eq!(reader.entries_read(), 2);
    }

    #[test]
    fn last_line_without_newline_and_crlf_are_accepted() {
        let mut reader = reader_over("a\ts1\r\nb\ts2", DecodePolicy::Strict);
        assert_eq!(paths(&mut reader), vec!["a", "b"]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut reader = reader_over("\n\na\ts1\n\n", DecodePolicy::Strict);
        assert_eq!(paths(&mut reader), vec!["a"]);
    }

    #[test]
    fn missing_file_behaves_as_empty_and_reports_once() {
        let tmp = tempfile::tempdir().unwrap();
        let location = SnapshotLocation::File(tmp.path().join("absent.inventory"));
        let mut reader = SnapshotReader::open(&location, DecodePolicy::Lenient);
        assert!(reader.read_entry().unwrap().is_none());
        let err = reader.take_open_error().expect("open error recorded");
        assert_eq!(err.code(), "DDR-2001");
        assert!(reader.take_open_error().is_none());
    }

    #[test]
    fn opens_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path: PathBuf = tmp.path().join("past.inventory");
        std::fs::write(&path, "x%2Fy\ts5\tt2001-02-03T04:05:06.7Z\n").unwrap();
        let mut reader = SnapshotReader::open(&SnapshotLocation::File(path), DecodePolicy::Strict);
        assert!(reader.open_error().is_none());
        let entry = reader.read_entry().unwrap().unwrap();
        assert_eq!(entry.path, "x/y");
        assert_eq!(entry.size, 5);
        assert_eq!(entry.mtime.timestamp_subsec_nanos(), 700_000_000);
    }

    #[test]
    fn lenient_counts_field_errors() {
        let mut reader = reader_over("a\tsx\nb\ts1\ttnope\n", DecodePolicy::Lenient);
        assert_eq!(paths(&mut reader), vec!["a", "b"]);
        assert_eq!(reader.field_errors(), 2);
    }

    #[test]
    fn strict_reports_line_number() {
        let mut reader = reader_over("a\ts1\n\nb\tsx\n", DecodePolicy::Strict);
        assert!(reader.read_entry().unwrap().is_some());
        match reader.read_entry().unwrap_err() {
            DendrError::SnapshotDecode { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_utf8_line_is_lossy_when_lenient() {
        let bytes = b"ok\ts1\n\xff\xfe\ts2\n".to_vec();
        let mut lenient = SnapshotReader::from_reader(Cursor::new(bytes.clone()), "mem", DecodePolicy::Lenient);
        assert_eq!(paths(&mut lenient).len(), 2);
        assert_eq!(lenient.field_errors(), 1);

        let mut strict = SnapshotReader::from_reader(Cursor::new(bytes), "mem", DecodePolicy::Strict);
        assert!(strict.read_entry().unwrap().is_some());
        assert!(strict.read_entry().is_err());
    }

    #[test]
    fn close_makes_reader_exhausted() {
        let mut reader = reader_over("a\ts1\n", DecodePolicy::Lenient);
        reader.close();
        assert!(reader.read_entry().unwrap().is_none());
    }
}
