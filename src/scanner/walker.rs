//! Sequential, sorted directory walker.
//!
//! Yields regular files in byte-wise order of their full path strings, which
//! is the order the merge comparator requires. Siblings are sorted by name,
//! with directories keyed as `name/`: since every descendant of `dir` starts
//! with `dir/`, a depth-first walk over that ordering emits full paths in
//! sorted order.
//!
//! Safety:
//! - Honors `follow_symlinks`; symlinks are skipped by default
//! - Never crosses filesystem boundaries unless configured
//! - Skips excluded paths and their subtrees
//! - Bounded by `max_depth`; symlink cycles are detected when following links
//!
//! Limitation: names that are not valid UTF-8 are converted lossily. Two
//! distinct such names in one directory can map to the same path string, and
//! the merge then sees a repeated path instead of a strictly increasing one.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

use crate::core::config::ScannerConfig;
use crate::core::errors::{DendrError, Result};
use crate::scanner::filter::ExclusionFilter;
use crate::snapshot::entry::FileEntry;

/// Walker configuration derived from `ScannerConfig`.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub root: PathBuf,
    /// Files deeper than this are not visited. Children of the root are depth 1.
    pub max_depth: usize,
    pub follow_symlinks: bool,
    pub cross_devices: bool,
    pub filter: ExclusionFilter,
}

impl WalkerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_filter(root, &ScannerConfig::default(), ExclusionFilter::empty())
    }

    pub fn from_scanner(root: impl Into<PathBuf>, scanner: &ScannerConfig) -> Result<Self> {
        let filter = ExclusionFilter::new(&scanner.excluded_paths, &scanner.exclude_patterns)?;
        Ok(Self::with_filter(root, scanner, filter))
    }

    fn with_filter(root: impl Into<PathBuf>, scanner: &ScannerConfig, filter: ExclusionFilter) -> Self {
        Self {
            root: root.into(),
            max_depth: scanner.max_depth.max(1),
            follow_symlinks: scanner.follow_symlinks,
            cross_devices: scanner.cross_devices,
            filter,
        }
    }
}

/// A path the walker could not visit. The walk continues past it.
#[derive(Debug)]
pub struct SkippedVisit {
    pub path: PathBuf,
    pub error: DendrError,
}

/// One step of a walk.
#[derive(Debug)]
pub enum WalkItem {
    File(FileEntry),
    Skipped(SkippedVisit),
}

/// Sorted walker over a single root.
#[derive(Debug, Clone)]
pub struct SortedWalker {
    config: WalkerConfig,
}

impl SortedWalker {
    pub fn new(config: WalkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Start a lazy walk. Nothing is read until the iterator is polled.
    ///
    /// The iterator yields `Err` at most once, when the root itself cannot be
    /// read; the walk is over after that.
    pub fn walk(&self) -> SortedWalk<'_> {
        SortedWalk {
            config: &self.config,
            stack: Vec::new(),
            root_dev: 0,
            state: WalkState::Start,
            skipped: 0,
        }
    }

    /// Walk to completion and collect the files, dropping skipped visits.
    pub fn files(&self) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        for item in self.walk() {
            if let WalkItem::File(entry) = item? {
                files.push(entry);
            }
        }
        Ok(files)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Start,
    Running,
    Done,
}

/// A listed directory whose children are being emitted.
struct Frame {
    children: std::vec::IntoIter<Child>,
    /// Depth of the children in this frame.
    depth: usize,
    /// (device, inode) of the listed directory.
    id: (u64, u64),
}

struct Child {
    key: String,
    path: PathBuf,
    kind: ChildKind,
}

enum ChildKind {
    Dir(fs::Metadata),
    File(FileEntry),
    Failed(io::Error),
}

/// Iterator state of one walk.
pub struct SortedWalk<'a> {
    config: &'a WalkerConfig,
    stack: Vec<Frame>,
    root_dev: u64,
    state: WalkState,
    skipped: u64,
}

impl SortedWalk<'_> {
    /// Visits that failed and were passed over.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn start(&mut self) -> Option<Result<WalkItem>> {
        self.state = WalkState::Done;
        let root = &self.config.root;

        // The root is followed even when it is a symlink: the caller named it.
        let meta = match fs::metadata(root) {
            Ok(meta) => meta,
            Err(source) => return Some(Err(traversal(root, source))),
        };

        if meta.is_file() {
            return match file_entry(root, &meta) {
                Ok(entry) => Some(Ok(WalkItem::File(entry))),
                Err(source) => Some(Err(traversal(root, source))),
            };
        }
        if !meta.is_dir() {
            return None;
        }

        self.root_dev = device_id(&meta);
        match self.list_dir(root, 1) {
            Ok(children) => {
                self.stack.push(Frame {
                    children: children.into_iter(),
                    depth: 1,
                    id: dir_id(&meta),
                });
                self.state = WalkState::Running;
                self.advance()
            }
            Err(source) => Some(Err(traversal(root, source))),
        }
    }

    fn advance(&mut self) -> Option<Result<WalkItem>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.state = WalkState::Done;
                return None;
            };
            let depth = frame.depth;
            let Some(child) = frame.children.next() else {
                self.stack.pop();
                continue;
            };

            match child.kind {
                ChildKind::File(entry) => return Some(Ok(WalkItem::File(entry))),
                ChildKind::Failed(source) => return Some(Ok(self.skip(child.path, source))),
                ChildKind::Dir(meta) => {
                    if !self.config.cross_devices && device_id(&meta) != self.root_dev {
                        continue;
                    }
                    let id = dir_id(&meta);
                    if self.config.follow_symlinks && self.stack.iter().any(|f| f.id == id) {
                        let source = io::Error::other("directory cycle through symlink");
                        return Some(Ok(self.skip(child.path, source)));
                    }
                    match self.list_dir(&child.path, depth + 1) {
                        Ok(children) => self.stack.push(Frame {
                            children: children.into_iter(),
                            depth: depth + 1,
                            id,
                        }),
                        Err(source) => return Some(Ok(self.skip(child.path, source))),
                    }
                }
            }
        }
    }

    fn skip(&mut self, path: PathBuf, source: io::Error) -> WalkItem {
        self.skipped += 1;
        WalkItem::Skipped(SkippedVisit {
            error: traversal(&path, source),
            path,
        })
    }

    /// Read and sort one directory. `depth` is the depth of its children.
    fn list_dir(&self, dir: &Path, depth: usize) -> io::Result<Vec<Child>> {
        let mut children = Vec::new();
        for entry_result in fs::read_dir(dir)? {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(source) => {
                    children.push(Child {
                        key: String::new(),
                        path: dir.to_path_buf(),
                        kind: ChildKind::Failed(source),
                    });
                    continue;
                }
            };

            let path = entry.path();
            if self.config.filter.is_excluded(&path) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();

            let meta = match entry.file_type() {
                Ok(ft) if ft.is_symlink() && !self.config.follow_symlinks => continue,
                Ok(ft) if ft.is_symlink() => fs::metadata(&path),
                Ok(_) => entry.metadata(),
                Err(source) => Err(source),
            };
            let meta = match meta {
                Ok(meta) => meta,
                Err(source) => {
                    children.push(Child {
                        key: name,
                        path,
                        kind: ChildKind::Failed(source),
                    });
                    continue;
                }
            };

            if meta.is_dir() {
                if depth < self.config.max_depth {
                    children.push(Child {
                        key: name + "/",
                        path,
                        kind: ChildKind::Dir(meta),
                    });
                }
            } else if meta.is_file() {
                let kind = match file_entry(&path, &meta) {
                    Ok(entry) => ChildKind::File(entry),
                    Err(source) => ChildKind::Failed(source),
                };
                children.push(Child {
                    key: name,
                    path,
                    kind,
                });
            }
        }

        children.sort_unstable_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));
        Ok(children)
    }
}

impl Iterator for SortedWalk<'_> {
    type Item = Result<WalkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            WalkState::Start => self.start(),
            WalkState::Running => self.advance(),
            WalkState::Done => None,
        }
    }
}

fn file_entry(path: &Path, meta: &fs::Metadata) -> io::Result<FileEntry> {
    let mtime = utc_mtime(meta.modified()?)?;
    let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
    Ok(FileEntry::new(path.to_string_lossy().into_owned(), size, mtime))
}

/// Convert a filesystem time, failing instead of panicking when it lies
/// outside the range `DateTime<Utc>` can represent.
fn utc_mtime(time: SystemTime) -> io::Result<DateTime<Utc>> {
    let converted = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs())
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, after.subsec_nanos())),
        Err(err) => {
            let before = err.duration();
            let (secs, nanos) = if before.subsec_nanos() == 0 {
                (i64::try_from(before.as_secs()).ok().map(|s| -s), 0)
            } else {
                (
                    i64::try_from(before.as_secs()).ok().map(|s| -s - 1),
                    1_000_000_000 - before.subsec_nanos(),
                )
            };
            secs.and_then(|secs| DateTime::from_timestamp(secs, nanos))
        }
    };
    converted.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("modification time out of range: {time:?}"),
        )
    })
}

fn traversal(path: &Path, source: io::Error) -> DendrError {
    DendrError::Traversal {
        path: path.to_path_buf(),
        source,
    }
}

/// Get device ID from metadata (for cross-device detection).
fn device_id(meta: &fs::Metadata) -> u64 {
    dir_id(meta).0
}

fn dir_id(meta: &fs::Metadata) -> (u64, u64) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        (meta.dev(), meta.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        (0, 0)
    }
}
