//! Line-oriented text codec for snapshot records.
//!
//! One record per line:
//!
//! ```text
//! <percent-encoded path>\ts<decimal size>\tt<RFC3339 UTC, nanoseconds>\n
//! ```
//!
//! The path is percent-encoded so the tab separator and the newline never
//! appear unescaped. Every field after the first starts with a one-byte tag;
//! unknown tags are skipped so newer writers can add fields.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{DendrError, Result};
use crate::snapshot::entry::{FileEntry, zero_mtime};

/// Field separator.
pub const FIELD_SEP: u8 = b'\t';
/// Tag of the size field.
pub const TAG_SIZE: u8 = b's';
/// Tag of the modification-time field.
pub const TAG_MTIME: u8 = b't';

/// What to do with a field that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Leave the attribute at its zero value and keep decoding the record.
    #[default]
    Lenient,
    /// Fail the whole record.
    Strict,
}

impl DecodePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for DecodePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown decode policy {other:?} (expected lenient|strict)")),
        }
    }
}

/// A decoded record plus the number of fields recovered under the lenient policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub entry: FileEntry,
    pub field_errors: u32,
}

/// Encoder/decoder with a fixed decode policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCodec {
    policy: DecodePolicy,
}

impl SnapshotCodec {
    pub const fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Encode one record, including its terminating newline.
    pub fn encode(&self, entry: &FileEntry) -> String {
        let mut out = String::with_capacity(entry.path.len() + 48);
        encode_into(entry, &mut out);
        out
    }

    /// Decode one line (without its line break). `line_no` is only used in errors.
    pub fn decode(&self, line: &str, line_no: u64) -> Result<Decoded> {
        let mut fields = split_fields(line);
        // split_fields always yields at least one (possibly empty) field.
        let raw_path = fields.next().unwrap_or_default();
        let mut field_errors = 0u32;

        let path = match urlencoding::decode(raw_path) {
            Ok(decoded) => decoded.into_owned(),
            Err(err) => {
                self.recover(line_no, format!("path is not UTF-8 after unescaping: {err}"))?;
                field_errors += 1;
                raw_path.to_string()
            }
        };

        let mut entry = FileEntry::new(path, 0, zero_mtime());

        for field in fields {
            let Some(&tag) = field.as_bytes().first() else {
                self.recover(line_no, "empty field".to_string())?;
                field_errors += 1;
                continue;
            };
            match tag {
                TAG_SIZE => match field[1..].parse::<i64>() {
                    Ok(size) => entry.size = size,
                    Err(err) => {
                        self.recover(line_no, format!("bad size {:?}: {err}", &field[1..]))?;
                        field_errors += 1;
                        entry.size = 0;
                    }
                },
                TAG_MTIME => match parse_mtime(&field[1..]) {
                    Ok(mtime) => entry.mtime = mtime,
                    Err(err) => {
                        self.recover(line_no, format!("bad mtime {:?}: {err}", &field[1..]))?;
                        field_errors += 1;
                        entry.mtime = zero_mtime();
                    }
                },
                _ => {}
            }
        }

        Ok(Decoded {
            entry,
            field_errors,
        })
    }

    /// Lenient: swallow the problem. Strict: turn it into a decode error.
    fn recover(&self, line: u64, details: String) -> Result<()> {
        match self.policy {
            DecodePolicy::Lenient => Ok(()),
            DecodePolicy::Strict => Err(DendrError::SnapshotDecode { line, details }),
        }
    }
}

/// Append the encoded record for `entry` (with newline) to `out`.
pub fn encode_into(entry: &FileEntry, out: &mut String) {
    use std::fmt::Write as _;

    out.push_str(&urlencoding::encode(&entry.path));
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "\t{}{}\t{}{}",
        char::from(TAG_SIZE),
        entry.size,
        char::from(TAG_MTIME),
        format_mtime(&entry.mtime)
    );
}

/// RFC3339 in UTC with all nine fractional digits.
pub fn format_mtime(mtime: &DateTime<Utc>) -> String {
    mtime.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC3339 timestamp with any offset, normalized to UTC.
pub fn parse_mtime(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc))
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    let bytes = line.as_bytes();
    let mut start = 0usize;
    let mut seps = memchr::memchr_iter(FIELD_SEP, bytes);
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        // The separator is ASCII, so every split index is a char boundary.
        if let Some(end) = seps.next() {
            let field = &line[start..end];
            start = end + 1;
            Some(field)
        } else {
            done = true;
            Some(&line[start..])
        }
    })
}
