//! Tool wrapper that traces every invocation.
//!
//! `InstrumentedTool` logs a `tool_input` event before the wrapped tool runs
//! and a `tool_output` event after it returns, then hands back the wrapped
//! tool's result untouched. A failing trace sink is reported with `warn!`
//! and never changes what the tool returns.

use std::{sync::Arc, time::Instant};

use serde_json::Value;
use tracing::{debug, warn};

use matscout_contracts::{
    error::HarnessResult,
    tool::{BoundArgs, ToolDescriptor},
    trace::{timestamp, TraceEvent},
};
use matscout_sandbox::value::str_form;

use crate::traits::{Tool, TraceSink};

/// Longest tool output, in characters, copied into a `tool_output` event.
pub const OUTPUT_PREVIEW_CHARS: usize = 5000;

pub struct InstrumentedTool<T> {
    inner: T,
    sink: Arc<dyn TraceSink>,
}

impl<T: Tool> InstrumentedTool<T> {
    pub fn new(inner: T, sink: Arc<dyn TraceSink>) -> Self {
        Self { inner, sink }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn emit(&self, event: TraceEvent) {
        if let Err(e) = self.sink.record(&event) {
            warn!(
                tool = %self.inner.descriptor().name,
                kind = event.kind(),
                error = %e,
                "failed to record tool trace event"
            );
        }
    }
}

impl<T: Tool> Tool for InstrumentedTool<T> {
    fn descriptor(&self) -> &ToolDescriptor {
        self.inner.descriptor()
    }

    fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
        let tool = self.inner.descriptor().name.clone();
        let raw = args.raw();

        self.emit(TraceEvent::ToolInput {
            tool: tool.clone(),
            args: raw.args.clone(),
            kwargs: raw.kwargs_json(),
            time: timestamp(),
        });

        let started = Instant::now();
        let result = self.inner.call(args);
        let duration = started.elapsed().as_secs_f64();

        let (output, error) = match &result {
            Ok(value) => (Some(preview(value)), None),
            Err(e) => (None, Some(e.to_string())),
        };
        debug!(tool = %tool, duration, failed = error.is_some(), "tool returned");

        self.emit(TraceEvent::ToolOutput {
            tool,
            output,
            error,
            duration,
            time: timestamp(),
        });

        result
    }
}

/// The tool result as the model would see it printed, truncated.
fn preview(value: &Value) -> String {
    str_form(value).chars().take(OUTPUT_PREVIEW_CHARS).collect()
}
