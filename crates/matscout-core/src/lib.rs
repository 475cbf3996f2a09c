//! # matscout-core
//!
//! The agent harness runtime: everything between a task string and a
//! `RunOutcome`.
//!
//! This crate provides:
//! - The four seam traits (`ChatBackend`, `Tool`, `TraceSink`, `TextSearch`)
//! - `ToolRegistry`, the closed and schema-checked set of tools
//! - `InstrumentedTool`, which traces every tool call
//! - `ModelAdapter`, the single path to the model backend
//! - `ActionParser`, which turns model text into an executable fragment
//! - `AgentLoop`, which wires them together with the sandbox
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matscout_core::{AgentLoop, AgentSettings, ToolRegistry};
//!
//! let registry = Arc::new(ToolRegistry::new(tools, sink.clone())?);
//! let mut agent = AgentLoop::new(backend, registry, sink, options, AgentSettings::default());
//! let outcome = agent.run(&compile_question("cutting board", "lightweight"));
//! ```

pub mod action;
pub mod adapter;
pub mod agent;
pub mod instrument;
pub mod prompt;
pub mod registry;
pub mod traits;

pub use action::{extract_final_answer, ActionParser, ParsedAction, FINAL_ANSWER};
pub use adapter::ModelAdapter;
pub use agent::{AgentLoop, AgentSettings};
pub use instrument::InstrumentedTool;
pub use prompt::{compile_question, render_system_prompt, DEFAULT_TEMPLATE};
pub use registry::ToolRegistry;
