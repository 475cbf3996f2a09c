//! # matscout-config
//!
//! TOML configuration for the matscout harness: model sampling options,
//! agent loop limits, store thresholds, and output paths.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use matscout_config::HarnessConfig;
//!
//! let config = HarnessConfig::from_file(Path::new("matscout.toml"))?;
//! let settings = config.agent_settings();
//! ```

pub mod config;
pub mod loader;

pub use config::{AgentSection, HarnessConfig, ModelSection, ResultsSection, StoreSection, TraceSection};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use matscout_contracts::error::HarnessError;

    use super::*;

    fn config_error(toml: &str) -> String {
        match HarnessConfig::from_toml_str(toml) {
            Err(HarnessError::Config { reason }) => reason,
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    /// An empty document yields the documented defaults.
    #[test]
    fn empty_document_uses_defaults() {
        let config = HarnessConfig::from_toml_str("").unwrap();
        assert_eq!(config, HarnessConfig::default());

        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.model.max_tokens, 512);
        assert_eq!(config.model.stop_sequences, vec!["<end_action>", "Observation:"]);
        assert_eq!(config.agent.max_steps, 10);
        assert!(!config.agent.dedupe_tool_calls);
        assert!(config.agent.suppress_reasoning);
        assert_eq!(config.store.name_threshold, 70);
        assert_eq!(config.store.property_threshold, 50);
        assert_eq!(config.store.top_k, 5);
        assert_eq!(config.trace.path, PathBuf::from("trace.jsonl"));
        assert_eq!(config.results.path, PathBuf::from("results/results.csv"));
    }

    /// Setting one field leaves its siblings at their defaults.
    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = HarnessConfig::from_toml_str(
            r#"
            [agent]
            max_steps = 4
            authorized_imports = ["math"]

            [store]
            path = "data/materials.csv"
        "#,
        )
        .unwrap();

        assert_eq!(config.agent.max_steps, 4);
        assert_eq!(config.agent.authorized_imports, vec!["math"]);
        assert!(config.agent.suppress_reasoning);
        assert_eq!(config.store.path.as_deref(), Some(Path::new("data/materials.csv")));
        assert_eq!(config.store.top_k, 5);
    }

    // ── Conversions ───────────────────────────────────────────────────────────

    #[test]
    fn sections_convert_to_runtime_settings() {
        let config = HarnessConfig::from_toml_str(
            r#"
            [model]
            temperature = 0.7
            top_p = 0.9
            stop_sequences = ["<end_code>"]

            [agent]
            dedupe_tool_calls = true
            suppress_reasoning = false

            [store]
            name_threshold = 80
        "#,
        )
        .unwrap();

        let options = config.generation_options();
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.top_p, Some(0.9));

        let settings = config.agent_settings();
        assert!(settings.dedupe_tool_calls);
        assert!(!settings.disable_thought);
        assert_eq!(settings.stop_sequences, vec!["<end_code>"]);

        assert_eq!(config.store_settings().name_threshold, 80);
    }

    // ── Errors ────────────────────────────────────────────────────────────────

    #[test]
    fn malformed_toml_is_a_config_error() {
        let reason = config_error("this is not valid toml ][[[");
        assert!(reason.contains("failed to parse config TOML"), "got: {reason}");
    }

    #[test]
    fn wrong_types_are_config_errors() {
        let reason = config_error("[agent]\nmax_steps = \"ten\"");
        assert!(reason.contains("failed to parse config TOML"), "got: {reason}");
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        assert!(config_error("[agent]\nmax_steps = 0").contains("max_steps"));
        assert!(config_error("[store]\nname_threshold = 101").contains("store.name_threshold"));
        assert!(config_error("[store]\nproperty_threshold = 150").contains("store.property_threshold"));
        assert!(config_error("[store]\ntop_k = 0").contains("top_k"));
        assert!(config_error("[model]\ntop_p = 1.5").contains("top_p"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matscout.toml");
        std::fs::write(&path, "[trace]\npath = \"runs/trace.jsonl\"\n").unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.trace.path, PathBuf::from("runs/trace.jsonl"));

        let missing = HarnessConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(missing.to_string().contains("failed to read config file"));
    }
}
