//! In-memory implementation of `TraceSink`.
//!
//! `MemoryTraceSink` keeps every recorded event in a `Vec` behind a mutex.
//! Clones share the same buffer, so a test can hand one clone to the agent
//! and inspect the other afterwards.

use std::sync::{Arc, Mutex};

use matscout_contracts::{
    error::{HarnessError, HarnessResult},
    trace::TraceEvent,
};
use matscout_core::traits::TraceSink;

#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The `kind` of every recorded event, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(TraceEvent::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, event: &TraceEvent) -> HarnessResult<u64> {
        let mut events = self.events.lock().map_err(|e| HarnessError::TraceWriteFailed {
            reason: format!("memory trace lock poisoned: {}", e),
        })?;
        events.push(event.clone());
        Ok(events.len() as u64 - 1)
    }
}
