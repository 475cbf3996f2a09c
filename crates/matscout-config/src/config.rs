//! Configuration schema.
//!
//! Every section and every field is optional in the TOML document; absent
//! values take the defaults below.
//!
//! ```toml
//! [model]
//! temperature = 0.2
//! max_tokens = 512
//! stop_sequences = ["<end_action>", "Observation:"]
//!
//! [agent]
//! max_steps = 10
//! dedupe_tool_calls = false
//! authorized_imports = []
//! suppress_reasoning = true
//!
//! [store]
//! path = "data/materials.csv"
//! name_threshold = 70
//! property_threshold = 50
//! top_k = 5
//!
//! [trace]
//! path = "trace.jsonl"
//!
//! [results]
//! path = "results/results.csv"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use matscout_contracts::conversation::GenerationOptions;
use matscout_core::{AgentSettings, DEFAULT_TEMPLATE};
use matscout_store::StoreSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub model: ModelSection,
    pub agent: AgentSection,
    pub store: StoreSection,
    pub trace: TraceSection,
    pub results: ResultsSection,
}

/// Sampling options forwarded to the model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: None,
            max_tokens: 512,
            stop_sequences: vec!["<end_action>".to_string(), "Observation:".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: u32,
    pub dedupe_tool_calls: bool,
    pub authorized_imports: Vec<String>,
    /// Ask reasoning models to skip their thinking phase.
    pub suppress_reasoning: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 10,
            dedupe_tool_calls: false,
            authorized_imports: Vec::new(),
            suppress_reasoning: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// CSV file backing the store; the built-in sample table when absent.
    pub path: Option<PathBuf>,
    pub name_threshold: u32,
    pub property_threshold: u32,
    pub top_k: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        let defaults = StoreSettings::default();
        Self {
            path: None,
            name_threshold: defaults.name_threshold,
            property_threshold: defaults.property_threshold,
            top_k: defaults.top_k,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSection {
    pub path: PathBuf,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self { path: PathBuf::from("trace.jsonl") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultsSection {
    pub path: PathBuf,
}

impl Default for ResultsSection {
    fn default() -> Self {
        Self { path: PathBuf::from("results/results.csv") }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl HarnessConfig {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.model.temperature,
            top_p: self.model.top_p,
            max_tokens: self.model.max_tokens,
            stop_sequences: self.model.stop_sequences.clone(),
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            max_steps: self.agent.max_steps,
            authorized_imports: self.agent.authorized_imports.clone(),
            dedupe_tool_calls: self.agent.dedupe_tool_calls,
            disable_thought: self.agent.suppress_reasoning,
            stop_sequences: self.model.stop_sequences.clone(),
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            name_threshold: self.store.name_threshold,
            property_threshold: self.store.property_threshold,
            top_k: self.store.top_k,
        }
    }
}
