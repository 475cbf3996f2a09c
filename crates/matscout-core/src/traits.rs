//! Core trait definitions for the matscout agent harness.
//!
//! These four traits are the seams between the loop and its collaborators:
//!
//! - `ChatBackend` is the language model, a black box from messages to text
//! - `Tool` is one capability the model may invoke from its code
//! - `TraceSink` records every prompt, response, and tool call
//! - `TextSearch` is an external retrieval service behind a search tool
//!
//! The agent loop wires them together. Nothing in this crate performs I/O
//! directly; every side effect goes through one of these traits.

use matscout_contracts::{
    conversation::{ChatMessage, Completion, GenerationOptions},
    error::HarnessResult,
    tool::{BoundArgs, ToolDescriptor},
    trace::TraceEvent,
};
use serde_json::Value;

/// The language model.
///
/// Implementations receive the normalized conversation and return the raw
/// completion text, which may still contain reasoning blocks. Any transport
/// or provider failure is reported as `HarnessError::ModelCall`.
pub trait ChatBackend: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> HarnessResult<Completion>;
}

/// A named capability exposed to the model.
///
/// The registry binds and schema-checks arguments before `call` runs, so an
/// implementation may rely on every non-nullable parameter being present
/// with the declared JSON type.
pub trait Tool: Send + Sync {
    /// The immutable public contract of this tool.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute the tool. Errors are rendered for the model by the registry.
    fn call(&self, args: &BoundArgs) -> HarnessResult<Value>;
}

impl Tool for Box<dyn Tool> {
    fn descriptor(&self) -> &ToolDescriptor {
        self.as_ref().descriptor()
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        self.as_ref().call(args)
    }
}

/// The trace destination.
///
/// `record` appends one event and returns the id it was stored under. Ids
/// are unique and strictly increasing per destination.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &TraceEvent) -> HarnessResult<u64>;
}

/// A text retrieval service, e.g. an encyclopedia or a preprint archive.
pub trait TextSearch: Send + Sync {
    /// Return a human-readable digest of the best matches for `query`.
    fn search(&self, query: &str) -> HarnessResult<String>;
}
