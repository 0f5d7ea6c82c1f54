//! Live tree traversal: sorted walker and exclusion rules.

pub mod filter;
pub mod walker;
