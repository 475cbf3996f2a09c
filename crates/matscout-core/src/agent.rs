//! The matscout agent loop: the step runner that drives one task to an answer.
//!
//! Each step follows the same pipeline:
//!
//!   Generate → Parse → Execute → Observe
//!
//! The model sees the system prompt and the task, replies with a thought and
//! a code fragment, and the fragment runs in the sandbox with the registry's
//! tools bound as host functions. Whatever the fragment printed (plus the
//! error, if it raised) becomes the next user turn. A call to a terminal tool
//! ends the run with that tool's value as the answer.
//!
//! A run always ends with exactly one `run_finished` trace event, whatever
//! the outcome.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tracing::{debug, info, warn};

use matscout_contracts::{
    conversation::{GenerationOptions, TokenUsage, Turn},
    error::HarnessError,
    execution::{RunId, RunOutcome, RunStatus, StepRecord, ToolInvocation},
    tool::ToolArgs,
    trace::TraceEvent,
};
use matscout_sandbox::{value::str_form, ExecOutcome, HostBridge, HostReply, Interpreter};

use crate::{
    action::ActionParser,
    adapter::ModelAdapter,
    prompt::{render_system_prompt, DEFAULT_TEMPLATE},
    registry::ToolRegistry,
    traits::{ChatBackend, TraceSink},
};

/// Appended to an observation when the fragment raised.
pub const RETRY_HINT: &str = "Now let's retry: take care not to repeat previous errors! \
If you have retried several times, try a completely different approach.";

/// Observation used when a fragment completed without printing anything.
pub const EMPTY_OBSERVATION: &str = "No output was printed. Use print() to see the result of a tool call.";

/// Loop-level settings, separate from the model's sampling options.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Maximum number of model calls per run.
    pub max_steps: u32,
    /// Modules the sandbox lets fragments import.
    pub authorized_imports: Vec<String>,
    /// Replay the result of a repeated identical tool call instead of
    /// invoking the tool again. Terminal tools are never replayed.
    pub dedupe_tool_calls: bool,
    /// Prefix the system prompt with the reasoning-suppression marker.
    pub disable_thought: bool,
    /// Stop sequences sent on every step; empty keeps the adapter's own.
    pub stop_sequences: Vec<String>,
    /// System prompt template with tool and import placeholders.
    pub template: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            authorized_imports: Vec::new(),
            dedupe_tool_calls: false,
            disable_thought: true,
            stop_sequences: vec!["<end_action>".to_string(), "Observation:".to_string()],
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Drives one task at a time through the model and the sandbox.
///
/// The registry is shared so one set of tools can serve many runs; the
/// adapter and interpreter are reset at the start of every `run`.
pub struct AgentLoop {
    adapter: ModelAdapter,
    registry: Arc<ToolRegistry>,
    sink: Arc<dyn TraceSink>,
    parser: ActionParser,
    settings: AgentSettings,
}

impl AgentLoop {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        registry: Arc<ToolRegistry>,
        sink: Arc<dyn TraceSink>,
        options: GenerationOptions,
        settings: AgentSettings,
    ) -> Self {
        let adapter = ModelAdapter::new(backend, Arc::clone(&sink), options);
        Self {
            adapter,
            registry,
            sink,
            parser: ActionParser::new(),
            settings,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// The system prompt every run starts with.
    pub fn system_prompt(&self) -> String {
        render_system_prompt(
            &self.settings.template,
            self.registry.descriptors(),
            &self.settings.authorized_imports,
            self.settings.disable_thought,
        )
    }

    /// Run `task` until a terminal tool is called, the model fails, or the
    /// step budget runs out.
    ///
    /// Never returns an error: every failure mode is a `RunStatus`, and the
    /// steps taken so far are kept in the outcome's history.
    pub fn run(&mut self, task: &str) -> RunOutcome {
        let run_id = RunId::new();
        let max_steps = self.settings.max_steps;

        info!(run_id = %run_id, max_steps, tools = self.registry.len(), "agent run starting");

        self.adapter.reset();
        let mut interpreter = Interpreter::new(self.settings.authorized_imports.clone());
        let mut conversation = vec![Turn::system(self.system_prompt()), Turn::user(task)];
        let mut cache: HashMap<String, Value> = HashMap::new();

        let mut history: Vec<StepRecord> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut last_visible: Option<String> = None;
        let mut finished: Option<(RunStatus, Option<String>)> = None;

        for step in 1..=max_steps {
            // ── Step 1: Generate ─────────────────────────────────────────────
            let completion = match self.adapter.generate(&conversation, &self.settings.stop_sequences) {
                Ok(completion) => completion,
                Err(e) => {
                    warn!(run_id = %run_id, step, error = %e, "model call failed, ending run");
                    finished = Some((RunStatus::ModelFailed { reason: e.to_string() }, last_visible.clone()));
                    break;
                }
            };
            usage.add(completion.usage);
            if !completion.text.is_empty() {
                last_visible = Some(completion.text.clone());
            }
            conversation.push(Turn::assistant(completion.text.clone()));

            // ── Step 2: Parse ────────────────────────────────────────────────
            let action = self.parser.parse(&completion.text);
            debug!(run_id = %run_id, step, strategy = ?action.strategy, "parsed action");

            // ── Step 3: Execute ──────────────────────────────────────────────
            let mut bridge = RegistryBridge {
                registry: &self.registry,
                cache: self.settings.dedupe_tool_calls.then_some(&mut cache),
                calls: Vec::new(),
            };
            let execution = interpreter.execute(&action.code, &mut bridge);
            let tool_calls = bridge.calls;

            // ── Step 4: Observe ──────────────────────────────────────────────
            let (observation, answer) = match execution.result {
                Ok(ExecOutcome::Finished(value)) => (None, Some(str_form(&value))),
                Ok(ExecOutcome::Completed) => (Some(format_observation(&execution.stdout, None)), None),
                Err(e) => {
                    let failure = HarnessError::SandboxExecution { reason: e.to_string() };
                    debug!(run_id = %run_id, step, error = %failure, "fragment raised");
                    (Some(format_observation(&execution.stdout, Some(&failure))), None)
                }
            };

            history.push(StepRecord {
                step,
                model_output: completion.text,
                code: action.code,
                strategy: action.strategy,
                tool_calls,
                observation: observation.clone(),
                answer: answer.clone(),
                usage: completion.usage,
            });

            if let Some(answer) = answer {
                info!(run_id = %run_id, step, "terminal tool called");
                finished = Some((RunStatus::Done, Some(answer)));
                break;
            }

            if let Some(observation) = observation {
                conversation.push(Turn::user(observation));
            }
        }

        let (status, answer) = finished.unwrap_or_else(|| {
            warn!(run_id = %run_id, max_steps, "step budget exhausted without an answer");
            (RunStatus::StepLimitExceeded, last_visible)
        });

        let outcome = RunOutcome { run_id, status, answer, history, usage };
        self.finish(&outcome);
        outcome
    }

    fn finish(&self, outcome: &RunOutcome) {
        let event = TraceEvent::RunFinished {
            run_id: outcome.run_id.to_string(),
            status: outcome.status.label().to_string(),
            steps: outcome.steps(),
            answer: outcome.answer.clone(),
        };
        if let Err(e) = self.sink.record(&event) {
            warn!(run_id = %outcome.run_id, error = %e, "failed to record run_finished event");
        }

        info!(
            run_id = %outcome.run_id,
            status = outcome.status.label(),
            steps = outcome.steps(),
            tokens = outcome.usage.total(),
            "agent run finished"
        );
    }
}

/// Build the user turn that reports a step's execution back to the model.
///
/// A `SandboxExecution` failure is shown as the exception text alone, the
/// way the fragment's own language would print it.
pub fn format_observation(stdout: &str, error: Option<&HarnessError>) -> String {
    let mut text = String::from("Observation:\n");
    match error {
        None if stdout.trim().is_empty() => text.push_str(EMPTY_OBSERVATION),
        None => text.push_str(stdout.trim_end()),
        Some(error) => {
            if !stdout.trim().is_empty() {
                text.push_str(stdout.trim_end());
                text.push('\n');
            }
            text.push_str("Error: ");
            match error {
                HarnessError::SandboxExecution { reason } => text.push_str(reason),
                other => text.push_str(&other.to_string()),
            }
            text.push('\n');
            text.push_str(RETRY_HINT);
        }
    }
    text
}

// ── Sandbox host ──────────────────────────────────────────────────────────────

/// Exposes the registry's tools to the sandbox for the length of one step.
struct RegistryBridge<'a> {
    registry: &'a ToolRegistry,
    cache: Option<&'a mut HashMap<String, Value>>,
    calls: Vec<ToolInvocation>,
}

impl HostBridge for RegistryBridge<'_> {
    fn provides(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    fn call(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<HostReply, String> {
        let arguments = ToolArgs { args, kwargs };
        self.calls.push(ToolInvocation {
            tool: name.to_string(),
            arguments: arguments.clone(),
        });

        let terminal = self.registry.is_terminal(name);
        let key = (!terminal).then(|| arguments.fingerprint(name));

        if let (Some(cache), Some(key)) = (self.cache.as_deref(), key.as_ref()) {
            if let Some(value) = cache.get(key) {
                debug!(tool = %name, "replaying cached tool result");
                return Ok(HostReply::Value(value.clone()));
            }
        }

        let value = self.registry.dispatch(name, &arguments).map_err(|e| e.to_string())?;

        if let (Some(cache), Some(key)) = (self.cache.as_deref_mut(), key) {
            cache.insert(key, value.clone());
        }

        Ok(if terminal {
            HostReply::Finish(value)
        } else {
            HostReply::Value(value)
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
