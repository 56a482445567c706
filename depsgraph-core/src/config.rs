//! Configuration
//!
//! Per-graph settings. A config is usually built in code via `Default` and
//! the builder-style setters, but it can also be loaded from JSON so that
//! tools can keep evaluation settings next to their scene fixtures.

use serde::{Deserialize, Serialize};

use crate::data::BaseFlags;
use crate::error::{DepsgraphError, Result};

/// Which set of visibility flags drives the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    /// Interactive viewport evaluation.
    #[default]
    Viewport,
    /// Final render evaluation.
    Render,
}

impl EvaluationMode {
    /// Base flag that makes an object visible in this mode.
    pub fn base_visibility_flag(self) -> BaseFlags {
        match self {
            EvaluationMode::Viewport => BaseFlags::VISIBLE_VIEWPORT,
            EvaluationMode::Render => BaseFlags::VISIBLE_RENDER,
        }
    }
}

/// Settings for building and evaluating one dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepsgraphConfig {
    /// Evaluation mode, decides which base visibility flag is used.
    pub mode: EvaluationMode,

    /// Worker threads for the scheduler. `None` lets rayon decide.
    pub threads: Option<usize>,

    /// Active graphs write evaluated results back to the original data.
    pub is_active: bool,

    /// Remove relations into no-op operations nothing depends on.
    pub prune_noops: bool,
}

impl Default for DepsgraphConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Viewport,
            threads: None,
            is_active: false,
            prune_noops: true,
        }
    }
}

impl DepsgraphConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Check settings that cannot be expressed in the type.
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(DepsgraphError::InvalidConfig(
                "'threads' must be >= 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DepsgraphConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, EvaluationMode::Viewport);
        assert!(config.prune_noops);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = DepsgraphConfig::from_json(r#"{ "mode": "render", "threads": 2 }"#).unwrap();
        assert_eq!(config.mode, EvaluationMode::Render);
        assert_eq!(config.threads, Some(2));
        assert!(!config.is_active);
        assert!(config.prune_noops);
    }

    #[test]
    fn zero_threads_rejected() {
        let err = DepsgraphConfig::from_json(r#"{ "threads": 0 }"#).unwrap_err();
        assert!(matches!(err, DepsgraphError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = DepsgraphConfig::from_json("{ mode: ").unwrap_err();
        assert!(matches!(err, DepsgraphError::InvalidConfig(_)));
    }
}
