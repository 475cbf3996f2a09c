//! Run driver: one agent run per design/criterion case.

use tracing::{info, warn};

use matscout_contracts::{error::HarnessResult, execution::RunOutcome};
use matscout_core::{compile_question, extract_final_answer, AgentLoop};

use crate::results::{ResultRecorder, ResultRow};

pub const DESIGNS: [&str; 4] = [
    "kitchen utensil grip",
    "safety helmet",
    "underwater component",
    "spacecraft component",
];

pub const CRITERIA: [&str; 4] = [
    "lightweight",
    "heat resistant",
    "corrosion resistant",
    "high strength",
];

/// The answer worth recording for `outcome`.
///
/// A finished run records its terminal answer. Otherwise the last visible
/// model text is searched for a literal `final_answer(...)` call, falling
/// back to the text itself.
pub fn recorded_answer(outcome: &RunOutcome) -> String {
    let text = outcome.answer.clone().unwrap_or_default();
    if outcome.status.is_done() {
        return text;
    }
    extract_final_answer(&text).unwrap_or(text)
}

pub fn result_row(design: &str, criterion: &str, outcome: &RunOutcome) -> ResultRow {
    ResultRow {
        design: design.to_string(),
        criterion: criterion.to_string(),
        status: outcome.status.label().to_string(),
        steps: outcome.steps(),
        answer: recorded_answer(outcome),
    }
}

pub struct RunDriver {
    agent: AgentLoop,
    recorder: Option<ResultRecorder>,
}

impl RunDriver {
    pub fn new(agent: AgentLoop) -> Self {
        Self { agent, recorder: None }
    }

    /// Append every row to `recorder` as soon as its run ends.
    pub fn with_recorder(mut self, recorder: ResultRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    /// Run a single case and record it.
    pub fn run_case(&mut self, design: &str, criterion: &str) -> HarnessResult<ResultRow> {
        let question = compile_question(design, criterion);
        let outcome = self.agent.run(&question);
        if !outcome.status.is_done() {
            warn!(design, criterion, status = outcome.status.label(), "run ended without an answer");
        }

        let row = result_row(design, criterion, &outcome);
        if let Some(recorder) = &self.recorder {
            recorder.add(&row)?;
        }
        Ok(row)
    }

    /// Run every design against every criterion, designs outermost.
    pub fn run_grid(&mut self, designs: &[&str], criteria: &[&str]) -> HarnessResult<Vec<ResultRow>> {
        let mut rows = Vec::with_capacity(designs.len() * criteria.len());
        for design in designs {
            for criterion in criteria {
                rows.push(self.run_case(design, criterion)?);
            }
        }
        let done = rows.iter().filter(|r| r.status == "done").count();
        info!(cases = rows.len(), done, "grid finished");
        Ok(rows)
    }

    pub fn run_standard_grid(&mut self) -> HarnessResult<Vec<ResultRow>> {
        self.run_grid(&DESIGNS, &CRITERIA)
    }
}
