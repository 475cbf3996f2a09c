//! Reading trace files back.

use std::{fs, path::Path};

use serde_json::{Map, Value};
use tracing::warn;

use matscout_contracts::{
    error::{HarnessError, HarnessResult},
    trace::TraceEvent,
};

/// Every well-formed JSON object line in the file, in file order.
///
/// A missing file reads as empty. Malformed lines are skipped with a warning.
pub fn read_entries(path: impl AsRef<Path>) -> HarnessResult<Vec<Map<String, Value>>> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(HarnessError::TraceWriteFailed {
                reason: format!("cannot read '{}': {}", path.display(), e),
            })
        }
    };

    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => entries.push(map),
            _ => warn!(path = %path.display(), line = index + 1, "skipping malformed trace line"),
        }
    }
    Ok(entries)
}

/// The typed events of a trace file with their ids.
///
/// Entries that carry no id or do not match a known event kind are skipped.
pub fn read_events(path: impl AsRef<Path>) -> HarnessResult<Vec<(u64, TraceEvent)>> {
    Ok(read_entries(path)?
        .into_iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_u64)?;
            let event = serde_json::from_value::<TraceEvent>(Value::Object(entry)).ok()?;
            Some((id, event))
        })
        .collect())
}
