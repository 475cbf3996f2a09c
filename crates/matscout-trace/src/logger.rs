//! The JSON Lines trace logger.

use std::{path::Path, sync::Arc};

use serde_json::{Map, Value};

use matscout_contracts::{error::HarnessResult, trace::TraceEvent};
use matscout_core::traits::TraceSink;

use crate::registry::{FileSlot, TraceRegistry};

/// Appends trace events to one file, one JSON object per line.
///
/// Any number of loggers may point at the same file; ids stay unique because
/// they all share the registry's slot for that path.
#[derive(Debug, Clone)]
pub struct JsonlTraceLogger {
    slot: Arc<FileSlot>,
}

impl JsonlTraceLogger {
    /// Open a logger on `path`, sharing id state through `registry`.
    ///
    /// The file is not touched until the first event is logged.
    pub fn open(path: impl AsRef<Path>, registry: &TraceRegistry) -> HarnessResult<Self> {
        let slot = registry.slot(path.as_ref())?;
        Ok(Self { slot })
    }

    /// `open` against the process-wide registry.
    pub fn open_global(path: impl AsRef<Path>) -> HarnessResult<Self> {
        Self::open(path, TraceRegistry::global())
    }

    pub fn path(&self) -> &Path {
        self.slot.path()
    }

    /// Append one entry and return the id it was written under.
    pub fn log(&self, payload: Map<String, Value>) -> HarnessResult<u64> {
        self.slot.append(&payload)
    }
}

impl TraceSink for JsonlTraceLogger {
    fn record(&self, event: &TraceEvent) -> HarnessResult<u64> {
        self.log(event.to_payload())
    }
}
