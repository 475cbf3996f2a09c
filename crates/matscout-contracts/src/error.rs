//! Runtime error types for the matscout harness.
//!
//! All fallible operations return `HarnessResult<T>`. Most variants never
//! escape the agent loop: tool and sandbox failures are rendered into
//! observation text so the model can see and correct its own mistakes.

use thiserror::Error;

/// The unified error type for the matscout harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No record name scored above the lookup threshold.
    #[error("no close matches found for material '{query}'")]
    NotFound { query: String },

    /// A requested property could not be resolved to a known column.
    #[error("could not find property '{property}'")]
    UnknownProperty { property: String },

    /// A numeric or range value could not be parsed.
    #[error("could not parse '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// Arguments supplied to a tool do not satisfy its descriptor.
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The model referenced a tool name that is not registered.
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    /// The underlying model call failed. Ends the run.
    #[error("model call failed: {reason}")]
    ModelCall { reason: String },

    /// The extracted code fragment raised while executing.
    #[error("code execution failed: {reason}")]
    SandboxExecution { reason: String },

    /// A trace entry could not be durably appended.
    #[error("trace write failed: {reason}")]
    TraceWriteFailed { reason: String },

    /// The backing store file could not be read or written.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// A benchmark result row could not be written or read back.
    #[error("result recording failed: {reason}")]
    Results { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Convenience alias used throughout the matscout crates.
pub type HarnessResult<T> = Result<T, HarnessError>;
