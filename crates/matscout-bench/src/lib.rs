//! # matscout-bench
//!
//! Everything needed to run the matscout agent end to end without a live
//! model:
//!
//! - `sample_data`: built-in Copper/Aluminum/Iron/Wood tables
//! - `scripted`: a replaying chat backend and keyword-keyed text search
//! - `harness`: assembling an `AgentLoop` from a `HarnessConfig`
//! - `driver`: the design × criterion grid, one run per case
//! - `results`: the CSV file each case's outcome is appended to

pub mod driver;
pub mod harness;
pub mod results;
pub mod sample_data;
pub mod scripted;

pub use driver::{recorded_answer, RunDriver, CRITERIA, DESIGNS};
pub use harness::{build_harness, load_store, Harness};
pub use results::{ResultRecorder, ResultRow};
pub use sample_data::{sample_store, TableShape};
pub use scripted::{CannedSearch, ScriptedBackend};

// ── End-to-end tests ──────────────────────────────────────────────────────────
