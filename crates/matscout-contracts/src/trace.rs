//! Trace event types.
//!
//! Every event is serialized as one JSON object with a `kind` discriminator.
//! The trace sink adds the file-scoped `id` when the event is written.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp format used in the `time` field of trace events.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time formatted for a trace event.
pub fn timestamp() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    /// The system prompt, logged once at the start of a run.
    LlmSystemPrompt { system_prompt: String },

    /// The latest input handed to the model on a step.
    LlmInput { step: u32, input: String, time: String },

    /// The visible model output for a step.
    LlmOutput {
        step: u32,
        output: String,
        duration: f64,
        input_tokens: u64,
        output_tokens: u64,
        time: String,
    },

    /// A tool invocation, logged before the tool runs.
    ToolInput {
        tool: String,
        args: Vec<Value>,
        kwargs: Value,
        time: String,
    },

    /// A tool result (or failure), logged after the tool returns.
    ToolOutput {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        duration: f64,
        time: String,
    },

    /// Closing record of an agent run.
    RunFinished {
        run_id: String,
        status: String,
        steps: u32,
        answer: Option<String>,
    },
}

impl TraceEvent {
    /// The `kind` string this event serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            TraceEvent::LlmSystemPrompt { .. } => "llm_system_prompt",
            TraceEvent::LlmInput { .. } => "llm_input",
            TraceEvent::LlmOutput { .. } => "llm_output",
            TraceEvent::ToolInput { .. } => "tool_input",
            TraceEvent::ToolOutput { .. } => "tool_output",
            TraceEvent::RunFinished { .. } => "run_finished",
        }
    }

    /// The event as a JSON object payload, ready for `id` to be merged in.
    pub fn to_payload(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Internally tagged enums always serialize to objects.
            _ => {
                let mut map = Map::new();
                map.insert("kind".into(), Value::String(self.kind().into()));
                map
            }
        }
    }
}
