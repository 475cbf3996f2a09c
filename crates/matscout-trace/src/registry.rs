//! Process-wide id bookkeeping for trace files.
//!
//! Every trace destination gets exactly one `FileSlot`, keyed by its
//! canonical path, no matter how many loggers open it or how the path was
//! spelled. The slot's mutex covers the whole "take id, serialize, append,
//! flush, advance" sequence, so ids in a file are unique and strictly
//! increasing in write order.
//!
//! A slot learns its first id lazily, on the first append, by scanning the
//! file for the largest existing id.

use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use matscout_contracts::error::{HarnessError, HarnessResult};

static GLOBAL: Lazy<TraceRegistry> = Lazy::new(TraceRegistry::new);

// ── Slot ──────────────────────────────────────────────────────────────────────

/// The write lock and next id of one trace file.
#[derive(Debug)]
pub struct FileSlot {
    path: PathBuf,
    /// `None` until the file has been scanned.
    next_id: Mutex<Option<u64>>,
}

impl FileSlot {
    fn new(path: PathBuf) -> Self {
        Self { path, next_id: Mutex::new(None) }
    }

    /// The canonical path this slot writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `payload` as one line with a fresh `id` as its first field.
    ///
    /// An `id` key already present in `payload` is replaced. The id is only
    /// consumed once the line has been written and flushed.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::TraceWriteFailed` when the file cannot be
    /// scanned, opened, or written.
    pub fn append(&self, payload: &Map<String, Value>) -> HarnessResult<u64> {
        let mut next_id = self.next_id.lock().map_err(|e| HarnessError::TraceWriteFailed {
            reason: format!("trace slot lock poisoned: {}", e),
        })?;

        let id = match *next_id {
            Some(id) => id,
            None => {
                let seeded = scan_next_id(&self.path)?;
                debug!(path = %self.path.display(), next_id = seeded, "trace file scanned");
                *next_id = Some(seeded);
                seeded
            }
        };

        let mut line = Map::with_capacity(payload.len() + 1);
        line.insert("id".to_string(), Value::from(id));
        for (key, value) in payload {
            if key != "id" {
                line.insert(key.clone(), value.clone());
            }
        }
        let text = serde_json::to_string(&Value::Object(line)).map_err(write_failed)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_failed)?;
        writeln!(file, "{}", text).map_err(write_failed)?;
        file.flush().map_err(write_failed)?;

        *next_id = Some(id + 1);
        Ok(id)
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Map from canonical trace path to its slot.
///
/// Use `TraceRegistry::global()` in production so every logger in the
/// process shares one view of each file. Tests may build a private registry.
#[derive(Debug, Default)]
pub struct TraceRegistry {
    slots: Mutex<HashMap<PathBuf, Arc<FileSlot>>>,
}

impl TraceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static TraceRegistry {
        &GLOBAL
    }

    /// The slot for `path`, created on first request.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::TraceWriteFailed` when the path has no file
    /// name or its parent directory cannot be created.
    pub fn slot(&self, path: &Path) -> HarnessResult<Arc<FileSlot>> {
        let canonical = canonical_path(path)?;
        let mut slots = self.slots.lock().map_err(|e| HarnessError::TraceWriteFailed {
            reason: format!("trace registry lock poisoned: {}", e),
        })?;
        let slot = slots
            .entry(canonical.clone())
            .or_insert_with(|| Arc::new(FileSlot::new(canonical)));
        Ok(Arc::clone(slot))
    }

    /// Number of distinct files seen so far.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create the parent directory, canonicalize it, and join the file name.
///
/// The file itself need not exist.
pub fn canonical_path(path: &Path) -> HarnessResult<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| HarnessError::TraceWriteFailed {
        reason: format!("trace path '{}' has no file name", path.display()),
    })?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_failed)?;
    let parent = fs::canonicalize(parent).map_err(write_failed)?;
    Ok(parent.join(file_name))
}

/// One past the largest `id` in the file; 0 when the file is absent or has
/// no valid lines.
pub fn scan_next_id(path: &Path) -> HarnessResult<u64> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(write_failed(e)),
    };

    let mut next = 0u64;
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line).ok().and_then(|v| v.get("id").and_then(Value::as_u64)) {
            Some(id) => next = next.max(id + 1),
            None => warn!(path = %path.display(), line = index + 1, "skipping malformed trace line"),
        }
    }
    Ok(next)
}

fn write_failed(e: impl std::fmt::Display) -> HarnessError {
    HarnessError::TraceWriteFailed { reason: e.to_string() }
}
