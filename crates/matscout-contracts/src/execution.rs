//! Step-level records and run outcomes.
//!
//! `StepRecord` is appended once per loop iteration and never modified.
//! `RunOutcome` is what the agent loop hands back to the run driver.

use serde::{Deserialize, Serialize};

use crate::{conversation::TokenUsage, tool::ToolArgs};

/// Unique identifier for a single agent run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    /// Create a new, unique run ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which recognizer produced the executable fragment for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStrategy {
    /// A fenced or `<code>`-delimited block.
    CodeBlock,
    /// An opening fence with no closing fence.
    UnterminatedBlock,
    /// Text following a `Code:` label.
    LabeledSection,
    /// A bare terminal-submission call found in prose.
    LiteralCall,
    /// The whole text wrapped into a terminal-submission call.
    Fallback,
}

/// One tool call made while executing a step's fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: ToolArgs,
}

/// An immutable record of one loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based step ordinal within the run.
    pub step: u32,
    /// Visible model output for this step.
    pub model_output: String,
    /// The fragment that was executed.
    pub code: String,
    pub strategy: ActionStrategy,
    pub tool_calls: Vec<ToolInvocation>,
    /// Observation fed back to the model; absent on the terminal step.
    pub observation: Option<String>,
    /// Set when the step invoked the terminal tool.
    pub answer: Option<String>,
    pub usage: TokenUsage,
}

/// Terminal status of an agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// The terminal tool was invoked.
    Done,
    /// The step budget ran out before a terminal call.
    StepLimitExceeded,
    /// The model backend failed; the run could not continue.
    ModelFailed { reason: String },
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Done => "done",
            RunStatus::StepLimitExceeded => "step_limit_exceeded",
            RunStatus::ModelFailed { .. } => "model_failed",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Done)
    }
}

/// Everything the run driver receives from one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    /// The terminal answer on `Done`; best-effort partial text otherwise.
    pub answer: Option<String>,
    pub history: Vec<StepRecord>,
    pub usage: TokenUsage,
}

impl RunOutcome {
    /// Number of steps the run executed.
    pub fn steps(&self) -> u32 {
        self.history.len() as u32
    }
}
