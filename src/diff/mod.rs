//! Change detection: classification, the sorted-merge comparator, sinks and
//! the run driver.

pub mod cancel;
pub mod change;
pub mod classifier;
pub mod merge;
pub mod run;
pub mod sink;
