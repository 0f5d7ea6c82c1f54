//! Collector sinks: where classified events go.

use crate::core::errors::Result;
use crate::diff::change::{ChangeCounts, ChangeEvent};

/// Consumer of classified events, called once per event in emission order.
///
/// Returning an error aborts the run; events already delivered stay delivered.
pub trait CollectorSink {
    /// Accept one event.
    fn record(&mut self, event: &ChangeEvent) -> Result<()>;
}

impl<S: CollectorSink + ?Sized> CollectorSink for &mut S {
    fn record(&mut self, event: &ChangeEvent) -> Result<()> {
        (**self).record(event)
    }
}

impl<S: CollectorSink + ?Sized> CollectorSink for Box<S> {
    fn record(&mut self, event: &ChangeEvent) -> Result<()> {
        (**self).record(event)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    /// Events in the order they were emitted.
    pub events: Vec<ChangeEvent>,
}

impl VecSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectorSink for VecSink {
    fn record(&mut self, event: &ChangeEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Tallies events without keeping them.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSink {
    /// Running totals.
    pub counts: ChangeCounts,
}

impl CollectorSink for CountingSink {
    fn record(&mut self, event: &ChangeEvent) -> Result<()> {
        self.counts.record(event.change);
        Ok(())
    }
}
