//! Tool descriptors and call arguments.
//!
//! A `ToolDescriptor` is what the model sees: an exact name, a description,
//! an ordered parameter list, and an output type. Descriptors are immutable
//! once a tool is registered.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Type tag for a tool parameter or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        }
    }

    /// The JSON Schema fragment accepting values of this type.
    fn json_schema(&self, nullable: bool) -> Value {
        match (self, nullable) {
            (ParamType::Any, _) => json!({}),
            (kind, false) => json!({ "type": kind.as_str() }),
            (kind, true) => json!({ "type": [kind.as_str(), "null"] }),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    /// When true the parameter may be omitted or passed as `None`.
    #[serde(default)]
    pub nullable: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// The public contract of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Exact, case-sensitive name the model must use.
    pub name: String,
    pub description: String,
    /// Parameters in positional order.
    pub inputs: Vec<ParamSpec>,
    pub output_type: ParamType,
    /// Invoking a terminal tool ends the agent run.
    #[serde(default)]
    pub terminal: bool,
}

impl ToolDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// JSON Schema for the bound-arguments object of this tool.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.inputs {
            properties.insert(param.name.clone(), param.kind.json_schema(param.nullable));
            if !param.nullable {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// The `{name: {type, description, nullable}}` map shown to the model.
    pub fn inputs_summary(&self) -> Value {
        let mut map = Map::new();
        for param in &self.inputs {
            let mut entry = Map::new();
            entry.insert("type".into(), Value::String(param.kind.as_str().into()));
            entry.insert("description".into(), Value::String(param.description.clone()));
            if param.nullable {
                entry.insert("nullable".into(), Value::Bool(true));
            }
            map.insert(param.name.clone(), Value::Object(entry));
        }
        Value::Object(map)
    }
}

/// Arguments of one tool invocation exactly as the caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolArgs {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl ToolArgs {
    pub fn positional(args: Vec<Value>) -> Self {
        Self { args, kwargs: Vec::new() }
    }

    pub fn keywords(kwargs: Vec<(String, Value)>) -> Self {
        Self { args: Vec::new(), kwargs }
    }

    /// The keyword arguments as a JSON object, in call order.
    pub fn kwargs_json(&self) -> Value {
        Value::Object(self.kwargs.iter().cloned().collect())
    }

    /// Stable key identifying this exact call, used for memoization.
    pub fn fingerprint(&self, tool: &str) -> String {
        format!(
            "{}|{}|{}",
            tool,
            Value::Array(self.args.clone()),
            self.kwargs_json()
        )
    }
}

/// Arguments after binding to a descriptor: every supplied value keyed by
/// parameter name, alongside the raw call they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    raw: ToolArgs,
    values: Map<String, Value>,
}

impl BoundArgs {
    pub fn new(raw: ToolArgs, values: Map<String, Value>) -> Self {
        Self { raw, values }
    }

    /// The arguments exactly as the caller supplied them.
    pub fn raw(&self) -> &ToolArgs {
        &self.raw
    }

    /// The bound values as a JSON object, the shape schema validation sees.
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.values
    }

    /// A bound value; absent and explicit `null` both read as `None`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}
