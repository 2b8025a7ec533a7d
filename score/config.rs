use crate::clusters::OutlierPolicy;
use crate::optim::BisectionConfig;
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Settings for one scan run, stored as human-readable TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub direction: Direction,
    /// Flat cost subtracted from every score. Must be non-negative.
    pub penalty: f64,
    /// Probability at or above which a record is predicted positive. Used only
    /// when the records carry no explicit error column.
    #[serde(default = "default_threshold")]
    pub classification_threshold: f64,
    #[serde(default)]
    pub outliers: OutlierPolicy,
    #[serde(default)]
    pub search: BisectionConfig,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Both,
            penalty: 0.0,
            classification_threshold: default_threshold(),
            outliers: OutlierPolicy::default(),
            search: BisectionConfig::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Penalty must be a finite, non-negative number, but got {0}.")]
    InvalidPenalty(f64),
    #[error("Classification threshold must lie in [0, 1], but got {0}.")]
    InvalidThreshold(f64),
    #[error("Invalid bisection settings: {0}")]
    InvalidSearch(String),
}

impl ScanConfig {
    /// Checks every field that the scoring kernel trusts without checking.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(ConfigError::InvalidPenalty(self.penalty));
        }
        if !(0.0..=1.0).contains(&self.classification_threshold) {
            return Err(ConfigError::InvalidThreshold(self.classification_threshold));
        }

        let search = &self.search;
        if !(search.q_lower > 0.0 && search.q_lower.is_finite()) {
            return Err(ConfigError::InvalidSearch(format!(
                "q_lower must be positive and finite, got {}",
                search.q_lower
            )));
        }
        if !(search.q_upper > search.q_lower && search.q_upper.is_finite()) {
            return Err(ConfigError::InvalidSearch(format!(
                "q_upper ({}) must be finite and exceed q_lower ({})",
                search.q_upper, search.q_lower
            )));
        }
        if !(search.q_lower..=search.q_upper).contains(&1.0) {
            return Err(ConfigError::InvalidSearch(format!(
                "the bracket [{}, {}] must contain q = 1",
                search.q_lower, search.q_upper
            )));
        }
        if !(search.tolerance > 0.0 && search.tolerance.is_finite()) {
            return Err(ConfigError::InvalidSearch(format!(
                "tolerance must be positive, got {}",
                search.tolerance
            )));
        }
        if search.max_iterations == 0 {
            return Err(ConfigError::InvalidSearch(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}
