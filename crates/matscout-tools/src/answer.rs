//! `final_answer`: the terminal tool.

use serde_json::Value;

use matscout_contracts::{
    error::HarnessResult,
    tool::{BoundArgs, ParamSpec, ParamType, ToolDescriptor},
};
use matscout_core::{traits::Tool, FINAL_ANSWER};

/// Hands its argument back unchanged; the agent loop ends the run on it.
pub struct FinalAnswer {
    descriptor: ToolDescriptor,
}

impl FinalAnswer {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: FINAL_ANSWER.to_string(),
                description: "Provides a final answer to the given problem.".to_string(),
                inputs: vec![ParamSpec::new("answer", ParamType::String, "The final answer to the problem.")],
                output_type: ParamType::String,
                terminal: true,
            },
        }
    }
}

impl Default for FinalAnswer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for FinalAnswer {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        Ok(args.get("answer").cloned().unwrap_or(Value::Null))
    }
}
