#![forbid(unsafe_code)]

//! dendr: detect changes in a directory tree between two points in time.
//!
//! A persisted snapshot of file metadata (path, size, modification time) is
//! compared against a live, sorted traversal of the tree in a single pass.
//! Every path is classified as added, removed, unchanged or stats-changed,
//! and the live traversal is written out as the snapshot for the next run.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use dendr::prelude::*;
//!
//! # fn main() -> dendr::core::errors::Result<()> {
//! let mut sink = VecSink::new();
//! let report = RunBuilder::new()
//!     .past(SnapshotLocation::parse("home.inventory"))
//!     .next(SnapshotLocation::parse("home.next.inventory"))
//!     .sink(&mut sink)
//!     .build()?
//!     .run(std::path::Path::new("/home"));
//! println!("{:?}: {} events", report.outcome, sink.events.len());
//! # Ok(())
//! # }
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use dendr::diff::merge::MergeComparator;
//! use dendr::scanner::walker::{SortedWalker, WalkerConfig};
//! ```

pub mod prelude;

pub mod core;
pub mod diff;
pub mod logger;
pub mod scanner;
#[cfg(feature = "signals")]
pub mod signals;
pub mod snapshot;
pub mod store;
