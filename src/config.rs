//! Aligner configuration.
//!
//! Loaded from TOML; every key has a default so a partial file (or no file at
//! all) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which discrete distribution scores span offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceKind {
    /// Difference of two Poisson counts.
    Skellam,
    /// Continuous approximation, evaluated at integer offsets.
    Gaussian,
}

/// Tunable parameters shared by all three alignment tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignConfig {
    /// Additive smoothing strength for every count table.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Resolve identically-labeled nodes jointly instead of letting the cheaper one win.
    #[serde(default = "default_true")]
    pub align_duplicates: bool,
    /// Exclude identically-labeled nodes from alignment entirely.
    #[serde(default)]
    pub ignore_duplicates: bool,
    /// Number of align/reestimate epochs.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    /// Enable the English structural-completion and exact-match rules.
    #[serde(default = "default_true")]
    pub english: bool,
    /// Fragment labels below this fraction of their token's total are pruned.
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f64,
    /// Minimum probability the null model assigns to leaving a span unaligned.
    #[serde(default = "default_null_floor")]
    pub null_floor: f64,
    /// Discount applied whenever scoring backs off from an exact match.
    #[serde(default = "default_partial_credit")]
    pub partial_credit: f64,
    /// Probability mass reserved for the catch-all pragmatic reentrancy.
    #[serde(default = "default_pragmatic_rate")]
    pub pragmatic_rate: f64,
    /// Offset distribution.
    #[serde(default = "default_distance")]
    pub distance: DistanceKind,
    /// Stop training as soon as perplexity goes up.
    #[serde(default)]
    pub stop_on_perplexity_increase: bool,
    /// Worker threads for sentence-level parallelism. Unset means one per core.
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_alpha() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_num_epochs() -> usize {
    5
}
fn default_prune_threshold() -> f64 {
    0.01
}
fn default_null_floor() -> f64 {
    0.05
}
fn default_partial_credit() -> f64 {
    0.1
}
fn default_pragmatic_rate() -> f64 {
    0.01
}
fn default_distance() -> DistanceKind {
    DistanceKind::Skellam
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            align_duplicates: true,
            ignore_duplicates: false,
            num_epochs: default_num_epochs(),
            english: true,
            prune_threshold: default_prune_threshold(),
            null_floor: default_null_floor(),
            partial_credit: default_partial_credit(),
            pragmatic_rate: default_pragmatic_rate(),
            distance: default_distance(),
            stop_on_perplexity_increase: false,
            threads: None,
        }
    }
}

impl AlignConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: "<memory>".into(),
            message: e.to_string(),
        })
    }

    /// Write to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Reject values that would make the scoring model improper.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return invalid(format!("alpha must be positive, got {}", self.alpha));
        }
        for (name, value) in [
            ("null_floor", self.null_floor),
            ("partial_credit", self.partial_credit),
            ("pragmatic_rate", self.pragmatic_rate),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if !(0.0..1.0).contains(&self.prune_threshold) {
            return invalid(format!(
                "prune_threshold must be in [0, 1), got {}",
                self.prune_threshold
            ));
        }
        if self.threads == Some(0) {
            return invalid("threads must be at least 1".into());
        }
        Ok(())
    }
}
