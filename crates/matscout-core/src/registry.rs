//! The closed tool registry.
//!
//! The set of tools is fixed at construction. Every tool is wrapped in an
//! `InstrumentedTool` so each invocation is traced, and each descriptor's
//! input schema is compiled once with `jsonschema`. Invocation goes through
//! three gates before the tool runs:
//!
//!   exact-name lookup → argument binding → schema validation
//!
//! A call stopped at a gate is traced by the registry itself, as a
//! `tool_input` with the raw arguments followed by a `tool_output` carrying
//! the error.

use std::{collections::HashMap, sync::Arc};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use matscout_contracts::{
    error::{HarnessError, HarnessResult},
    tool::{BoundArgs, ToolArgs, ToolDescriptor},
    trace::{timestamp, TraceEvent},
};

use crate::{
    instrument::InstrumentedTool,
    traits::{Tool, TraceSink},
};

struct Entry {
    tool: InstrumentedTool<Box<dyn Tool>>,
    validator: jsonschema::Validator,
}

pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    sink: Arc<dyn TraceSink>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Build a registry over `tools`, tracing every call into `sink`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` when two tools share a name or a
    /// descriptor's derived schema does not compile.
    pub fn new(tools: Vec<Box<dyn Tool>>, sink: Arc<dyn TraceSink>) -> HarnessResult<Self> {
        let mut entries = Vec::with_capacity(tools.len());
        let mut index = HashMap::new();

        for tool in tools {
            let descriptor = tool.descriptor().clone();
            if index.contains_key(&descriptor.name) {
                return Err(HarnessError::Config {
                    reason: format!("duplicate tool name '{}'", descriptor.name),
                });
            }
            let validator = jsonschema::validator_for(&descriptor.input_schema()).map_err(|e| {
                HarnessError::Config {
                    reason: format!("invalid input schema for tool '{}': {}", descriptor.name, e),
                }
            })?;

            index.insert(descriptor.name.clone(), entries.len());
            entries.push(Entry {
                tool: InstrumentedTool::new(tool, Arc::clone(&sink)),
                validator,
            });
        }

        Ok(Self { entries, index, sink })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.tool.descriptor().name.as_str())
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|e| e.tool.descriptor())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entry(name).map(|e| e.tool.descriptor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// True when `name` is registered and ends the run when called.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.descriptor(name).map(|d| d.terminal).unwrap_or(false)
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Look up, bind, validate, and run a tool.
    ///
    /// # Errors
    ///
    /// - `UnknownTool` when no tool has exactly this name
    /// - `InvalidArguments` when binding or schema validation fails
    /// - whatever the tool itself returns
    pub fn invoke(&self, name: &str, args: &ToolArgs) -> HarnessResult<Value> {
        let (entry, bound) = match self.admit(name, args) {
            Ok(admitted) => admitted,
            Err(e) => {
                self.trace_rejection(name, args, &e);
                return Err(e);
            }
        };

        debug!(tool = %name, "invoking tool");
        entry.tool.call(&bound)
    }

    /// The three gates: lookup, binding, and schema validation.
    fn admit(&self, name: &str, args: &ToolArgs) -> HarnessResult<(&Entry, BoundArgs)> {
        let entry = self
            .entry(name)
            .ok_or_else(|| HarnessError::UnknownTool { name: name.to_string() })?;
        let descriptor = entry.tool.descriptor();

        let bound = bind_arguments(descriptor, args)?;

        let instance = Value::Object(bound.as_object().clone());
        let problems: Vec<String> = entry
            .validator
            .iter_errors(&instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path.trim_start_matches('/'), error)
                }
            })
            .collect();
        if !problems.is_empty() {
            warn!(tool = %name, problems = ?problems, "tool arguments failed schema validation");
            return Err(HarnessError::InvalidArguments {
                tool: name.to_string(),
                reason: problems.join("; "),
            });
        }

        Ok((entry, bound))
    }

    fn trace_rejection(&self, name: &str, args: &ToolArgs, error: &HarnessError) {
        let events = [
            TraceEvent::ToolInput {
                tool: name.to_string(),
                args: args.args.clone(),
                kwargs: args.kwargs_json(),
                time: timestamp(),
            },
            TraceEvent::ToolOutput {
                tool: name.to_string(),
                output: None,
                error: Some(error.to_string()),
                duration: 0.0,
                time: timestamp(),
            },
        ];
        for event in &events {
            if let Err(e) = self.sink.record(event) {
                warn!(tool = %name, kind = event.kind(), error = %e, "failed to record tool trace event");
            }
        }
    }

    /// `invoke`, with tool failures rendered for the model.
    ///
    /// Lookup and binding failures stay errors so the caller can surface them
    /// as a failed step. Failures raised by the tool itself become an
    /// `"Error: <message>"` string result the model can read and react to.
    pub fn dispatch(&self, name: &str, args: &ToolArgs) -> HarnessResult<Value> {
        match self.invoke(name, args) {
            Ok(value) => Ok(value),
            Err(e @ (HarnessError::UnknownTool { .. } | HarnessError::InvalidArguments { .. })) => {
                Err(e)
            }
            Err(e) => Ok(Value::String(format!("Error: {}", e))),
        }
    }
}

/// Bind positional then keyword arguments to the descriptor's parameters.
///
/// Missing nullable parameters are left unbound; missing required ones are
/// an error.
pub fn bind_arguments(descriptor: &ToolDescriptor, args: &ToolArgs) -> HarnessResult<BoundArgs> {
    let invalid = |reason: String| HarnessError::InvalidArguments {
        tool: descriptor.name.clone(),
        reason,
    };

    if args.args.len() > descriptor.inputs.len() {
        return Err(invalid(format!(
            "takes {} positional argument(s) but {} were given",
            descriptor.inputs.len(),
            args.args.len()
        )));
    }

    let mut values = Map::new();
    for (param, value) in descriptor.inputs.iter().zip(&args.args) {
        values.insert(param.name.clone(), value.clone());
    }

    for (name, value) in &args.kwargs {
        if descriptor.param(name).is_none() {
            return Err(invalid(format!("unexpected keyword argument '{}'", name)));
        }
        if values.contains_key(name) {
            return Err(invalid(format!("got multiple values for argument '{}'", name)));
        }
        values.insert(name.clone(), value.clone());
    }

    if let Some(missing) = descriptor
        .inputs
        .iter()
        .find(|p| !p.nullable && !values.contains_key(&p.name))
    {
        return Err(invalid(format!("missing required argument '{}'", missing.name)));
    }

    Ok(BoundArgs::new(args.clone(), values))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use matscout_contracts::{
        tool::{ParamSpec, ParamType},
        trace::TraceEvent,
    };
    use serde_json::json;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// `rank(material, top_k=None)`: echoes its bound arguments, fails on "boom".
    struct Rank {
        descriptor: ToolDescriptor,
    }

    impl Rank {
        fn boxed(name: &str, terminal: bool) -> Box<dyn Tool> {
            Box::new(Self {
                descriptor: ToolDescriptor {
                    name: name.to_string(),
                    description: "Rank materials".to_string(),
                    inputs: vec![
                        ParamSpec::new("material", ParamType::String, "Material name"),
                        ParamSpec::new("top_k", ParamType::Integer, "How many").nullable(),
                    ],
                    output_type: ParamType::Object,
                    terminal,
                },
            })
        }
    }

    impl Tool for Rank {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        fn call(&self, args: &BoundArgs) -> HarnessResult<Value> {
            if args.str("material") == Some("boom") {
                return Err(HarnessError::Store { reason: "table unavailable".into() });
            }
            Ok(Value::Object(args.as_object().clone()))
        }
    }

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<TraceEvent>>,
    }

    impl TraceSink for Collect {
        fn record(&self, event: &TraceEvent) -> HarnessResult<u64> {
            let mut events = self.events.lock().unwrap();
            events.push(event.clone());
            Ok(events.len() as u64 - 1)
        }
    }

    fn registry() -> (ToolRegistry, Arc<Collect>) {
        let sink = Arc::new(Collect::default());
        let registry = ToolRegistry::new(
            vec![Rank::boxed("rank", false), Rank::boxed("final_answer", true)],
            sink.clone(),
        )
        .unwrap();
        (registry, sink)
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn names_keep_registration_order() {
        let (registry, _) = registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["rank", "final_answer"]);
        assert!(registry.is_terminal("final_answer"));
        assert!(!registry.is_terminal("rank"));
        assert!(!registry.is_terminal("missing"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ToolRegistry::new(
            vec![Rank::boxed("rank", false), Rank::boxed("rank", false)],
            Arc::new(Collect::default()),
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::Config { ref reason } if reason.contains("duplicate tool name 'rank'")));
    }

    // ── Invocation gates ──────────────────────────────────────────────────────

    #[test]
    fn positional_and_keyword_arguments_bind_by_name() {
        let (registry, sink) = registry();
        let args = ToolArgs {
            args: vec![json!("Wood")],
            kwargs: vec![("top_k".into(), json!(3))],
        };
        let value = registry.invoke("rank", &args).unwrap();
        assert_eq!(value, json!({ "material": "Wood", "top_k": 3 }));

        let kinds: Vec<&str> = sink.events.lock().unwrap().iter().map(TraceEvent::kind).collect();
        assert_eq!(kinds, vec!["tool_input", "tool_output"]);
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let (registry, sink) = registry();
        let err = registry.invoke("Rank", &ToolArgs::positional(vec![json!("Wood")])).unwrap_err();
        assert_eq!(err.to_string(), "unknown tool 'Rank'");

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2, "a rejected call is traced once");
        match &events[0] {
            TraceEvent::ToolInput { tool, args, .. } => {
                assert_eq!(tool, "Rank");
                assert_eq!(args, &vec![json!("Wood")]);
            }
            other => panic!("expected tool_input, got {:?}", other),
        }
        match &events[1] {
            TraceEvent::ToolOutput { output: None, error: Some(e), .. } => {
                assert_eq!(e, "unknown tool 'Rank'");
            }
            other => panic!("expected tool_output with an error, got {:?}", other),
        }
    }

    #[test]
    fn binding_errors_are_invalid_arguments() {
        let (registry, _) = registry();
        let cases = [
            (ToolArgs::positional(vec![json!("a"), json!(1), json!(2)]), "takes 2 positional argument(s) but 3 were given"),
            (ToolArgs::keywords(vec![("colour".into(), json!("red"))]), "unexpected keyword argument 'colour'"),
            (
                ToolArgs { args: vec![json!("a")], kwargs: vec![("material".into(), json!("b"))] },
                "got multiple values for argument 'material'",
            ),
            (ToolArgs::default(), "missing required argument 'material'"),
        ];
        for (args, expected) in cases {
            let err = registry.invoke("rank", &args).unwrap_err();
            assert!(
                matches!(err, HarnessError::InvalidArguments { ref reason, .. } if reason.contains(expected)),
                "expected '{}', got: {}",
                expected,
                err
            );
        }
    }

    #[test]
    fn schema_rejects_wrong_types() {
        let (registry, sink) = registry();
        let err = registry
            .invoke("rank", &ToolArgs::keywords(vec![("material".into(), json!(42))]))
            .unwrap_err();
        assert!(
            matches!(err, HarnessError::InvalidArguments { ref tool, ref reason } if tool == "rank" && reason.starts_with("material: ")),
            "got: {}",
            err
        );
        let events = sink.events.lock().unwrap();
        let kinds: Vec<&str> = events.iter().map(TraceEvent::kind).collect();
        assert_eq!(kinds, vec!["tool_input", "tool_output"], "the rejection is traced once");
        match &events[0] {
            TraceEvent::ToolInput { kwargs, .. } => assert_eq!(kwargs, &json!({ "material": 42 })),
            other => panic!("expected tool_input, got {:?}", other),
        }
        assert!(
            matches!(&events[1], TraceEvent::ToolOutput { error: Some(e), .. } if e.starts_with("invalid arguments for tool 'rank'")),
            "got: {:?}",
            events[1]
        );
    }

    #[test]
    fn nullable_parameters_accept_none() {
        let (registry, _) = registry();
        let args = ToolArgs::positional(vec![json!("Wood"), Value::Null]);
        assert!(registry.invoke("rank", &args).is_ok());
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    #[test]
    fn dispatch_renders_tool_failures_as_values() {
        let (registry, sink) = registry();
        let value = registry.dispatch("rank", &ToolArgs::positional(vec![json!("boom")])).unwrap();
        assert_eq!(value, json!("Error: store error: table unavailable"));

        let events = sink.events.lock().unwrap();
        assert!(
            matches!(&events[1], TraceEvent::ToolOutput { error: Some(e), .. } if e.contains("table unavailable")),
            "the failure is traced as an error"
        );
    }

    #[test]
    fn dispatch_keeps_gate_failures_as_errors() {
        let (registry, _) = registry();
        assert!(registry.dispatch("nope", &ToolArgs::default()).is_err());
        assert!(registry.dispatch("rank", &ToolArgs::default()).is_err());
    }
}
