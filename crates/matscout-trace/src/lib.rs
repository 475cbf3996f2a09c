//! # matscout-trace
//!
//! Append-only JSON Lines trace logging for the matscout harness.
//!
//! ## Overview
//!
//! Every prompt, model reply, and tool call the agent makes is written as one
//! JSON object per line. The first field of each line is an integer `id`
//! that is unique and strictly increasing within the file, across every
//! logger in the process and across process restarts: a file that already
//! holds entries resumes at one past its largest id.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matscout_trace::JsonlTraceLogger;
//! use matscout_core::traits::TraceSink;
//!
//! let logger = JsonlTraceLogger::open_global("trace.jsonl")?;
//! let id = logger.record(&event)?;
//! let entries = matscout_trace::read_entries("trace.jsonl")?;
//! ```

pub mod logger;
pub mod memory;
pub mod reader;
pub mod registry;

pub use logger::JsonlTraceLogger;
pub use memory::MemoryTraceSink;
pub use reader::{read_entries, read_events};
pub use registry::{canonical_path, FileSlot, TraceRegistry};

// ── Tests ─────────────────────────────────────────────────────────────────────
