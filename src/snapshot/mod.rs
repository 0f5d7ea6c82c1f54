//! Persisted snapshots: record codec, sequential reader, append-only writer.

pub mod codec;
pub mod entry;
pub mod reader;
pub mod writer;
