//! Per-exercise engine configuration.
//!
//! Loaded from TOML with per-field defaults, so a deployment only spells
//! out the thresholds it actually tunes.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunable parameters of one exercise's grading engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseConfig {
    /// Similarity above which an element joins an existing class
    /// (strictly-greater comparison).
    #[serde(default = "default_equality_threshold")]
    pub equality_threshold: f64,

    /// Minimum agreement ratio for an automatic suggestion; classes below
    /// it produce no consensus.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Hard cap on the selector's candidate window.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Initial candidate window size.
    #[serde(default = "default_window_start")]
    pub window_start: usize,

    /// Candidate window growth step.
    #[serde(default = "default_window_growth")]
    pub window_growth: usize,

    /// Coverage closeness margin for window growth.
    #[serde(default = "default_window_margin")]
    pub window_margin: f64,

    /// Wall-clock budget for candidate scoring, in milliseconds. The
    /// similarity calls are externally supplied and of unknown cost; 0
    /// disables the budget.
    #[serde(default = "default_selection_timeout_ms")]
    pub selection_timeout_ms: u64,
}

fn default_equality_threshold() -> f64 {
    0.8
}
fn default_confidence_threshold() -> f64 {
    0.75
}
fn default_max_candidates() -> usize {
    50
}
fn default_window_start() -> usize {
    10
}
fn default_window_growth() -> usize {
    5
}
fn default_window_margin() -> f64 {
    0.15
}
fn default_selection_timeout_ms() -> u64 {
    5000
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            equality_threshold: default_equality_threshold(),
            confidence_threshold: default_confidence_threshold(),
            max_candidates: default_max_candidates(),
            window_start: default_window_start(),
            window_growth: default_window_growth(),
            window_margin: default_window_margin(),
            selection_timeout_ms: default_selection_timeout_ms(),
        }
    }
}

impl ExerciseConfig {
    /// Parse a TOML string; absent keys fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ExerciseConfig =
            toml::from_str(content).context("failed to parse exercise config TOML")?;
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read exercise config: {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Check the parameters for internal consistency.
    ///
    /// The equality threshold is only required to be finite: similarity
    /// ranges are type-dependent and not necessarily bounded by 1.0.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.equality_threshold.is_finite() {
            return Err("equality_threshold must be finite".into());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.window_start == 0 {
            return Err("window_start must be at least 1".into());
        }
        if self.window_growth == 0 {
            return Err("window_growth must be at least 1".into());
        }
        if self.max_candidates < self.window_start {
            return Err(format!(
                "max_candidates ({}) must not be below window_start ({})",
                self.max_candidates, self.window_start
            ));
        }
        if !self.window_margin.is_finite() || self.window_margin < 0.0 {
            return Err("window_margin must be a non-negative finite value".into());
        }
        Ok(())
    }
}
