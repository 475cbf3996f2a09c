//! Loading and validating a `HarnessConfig`.

use std::path::Path;

use tracing::debug;

use matscout_contracts::error::{HarnessError, HarnessResult};

use crate::config::HarnessConfig;

impl HarnessConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `HarnessError::Config` if the TOML is malformed, does not
    /// match the schema, or fails `validate`.
    pub fn from_toml_str(s: &str) -> HarnessResult<Self> {
        let config: HarnessConfig = toml::from_str(s).map_err(|e| HarnessError::Config {
            reason: format!("failed to parse config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as harness configuration.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| HarnessError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Reject values the harness cannot run with.
    pub fn validate(&self) -> HarnessResult<()> {
        let fail = |reason: String| Err(HarnessError::Config { reason });

        if self.agent.max_steps == 0 {
            return fail("agent.max_steps must be at least 1".to_string());
        }
        if self.model.max_tokens == 0 {
            return fail("model.max_tokens must be at least 1".to_string());
        }
        if self.model.temperature.is_nan() || self.model.temperature < 0.0 {
            return fail(format!("model.temperature must be non-negative, got {}", self.model.temperature));
        }
        if let Some(top_p) = self.model.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return fail(format!("model.top_p must lie in [0, 1], got {}", top_p));
            }
        }
        for (name, value) in [
            ("store.name_threshold", self.store.name_threshold),
            ("store.property_threshold", self.store.property_threshold),
        ] {
            if value > 100 {
                return fail(format!("{} must be at most 100, got {}", name, value));
            }
        }
        if self.store.top_k == 0 {
            return fail("store.top_k must be at least 1".to_string());
        }
        Ok(())
    }
}
