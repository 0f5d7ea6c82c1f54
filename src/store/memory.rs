//! In-memory keyed store. State lives as long as the value.

#![allow(missing_docs)]

use std::collections::HashMap;

use crate::core::errors::Result;
use crate::store::{EntryStats, KeyedStore};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, EntryStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyedStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<EntryStats>> {
        Ok(self.entries.get(path).copied())
    }

    fn set(&mut self, path: &str, stats: &EntryStats) -> Result<()> {
        self.entries.insert(path.to_string(), *stats);
        Ok(())
    }
}
