//! Model adapter: the only path from the agent loop to the `ChatBackend`.
//!
//! Each call to `generate` counts as one step. The adapter folds message
//! content into plain text, forwards sampling options, strips reasoning
//! blocks from the reply, and traces the exchange:
//!
//! - step 1 only: `llm_system_prompt`
//! - every step: `llm_input` before the call, `llm_output` after it

use std::{sync::Arc, time::Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use matscout_contracts::{
    conversation::{ChatMessage, Completion, GenerationOptions, Role, Turn},
    error::{HarnessError, HarnessResult},
    trace::{timestamp, TraceEvent},
};

use crate::traits::{ChatBackend, TraceSink};

static REASONING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("reasoning pattern is valid"));

/// Remove every `<think>…</think>` block (and the whitespace after it), then
/// trim the remainder.
pub fn strip_reasoning(text: &str) -> String {
    REASONING_BLOCK.replace_all(text, "").trim().to_string()
}

/// Fold each turn's content into the plain messages the backend receives.
pub fn normalize(conversation: &[Turn]) -> Vec<ChatMessage> {
    conversation
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role,
            content: turn.content.to_text(),
        })
        .collect()
}

pub struct ModelAdapter {
    backend: Arc<dyn ChatBackend>,
    sink: Arc<dyn TraceSink>,
    options: GenerationOptions,
    step: u32,
}

impl ModelAdapter {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sink: Arc<dyn TraceSink>,
        options: GenerationOptions,
    ) -> Self {
        Self { backend, sink, options, step: 0 }
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Number of `generate` calls since construction or the last `reset`.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Start a new run: the next `generate` call is step 1 again.
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Send the conversation to the backend and return the visible reply.
    ///
    /// `stop_sequences`, when non-empty, replace the configured ones for this
    /// call.
    ///
    /// # Errors
    ///
    /// Any backend failure is returned as `HarnessError::ModelCall`.
    pub fn generate(&mut self, conversation: &[Turn], stop_sequences: &[String]) -> HarnessResult<Completion> {
        self.step += 1;
        let step = self.step;
        let messages = normalize(conversation);

        if step == 1 {
            if let Some(system) = messages.iter().find(|m| m.role == Role::System) {
                self.emit(TraceEvent::LlmSystemPrompt {
                    system_prompt: system.content.clone(),
                });
            }
        }

        let input = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.emit(TraceEvent::LlmInput { step, input, time: timestamp() });

        let mut options = self.options.clone();
        if !stop_sequences.is_empty() {
            options.stop_sequences = stop_sequences.to_vec();
        }

        debug!(step, messages = messages.len(), "calling model backend");
        let started = Instant::now();
        let completion = self.backend.complete(&messages, &options).map_err(|e| match e {
            HarnessError::ModelCall { .. } => e,
            other => HarnessError::ModelCall { reason: other.to_string() },
        })?;
        let duration = started.elapsed().as_secs_f64();

        let text = strip_reasoning(&completion.text);
        self.emit(TraceEvent::LlmOutput {
            step,
            output: text.clone(),
            duration,
            input_tokens: completion.usage.input_tokens,
            output_tokens: completion.usage.output_tokens,
            time: timestamp(),
        });

        Ok(Completion { text, usage: completion.usage })
    }

    fn emit(&self, event: TraceEvent) {
        if let Err(e) = self.sink.record(&event) {
            warn!(step = self.step, kind = event.kind(), error = %e, "failed to record model trace event");
        }
    }
}
