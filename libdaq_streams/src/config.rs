use serde::{Deserialize, Serialize};
use std::path::Path;

use super::constants::NANOS_PER_SECOND;
use super::error::ConfigError;
use super::timestamp::Inclusive;

/// Structure representing the loader configuration.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// How far, in seconds, a row may precede its predecessor before a warning is raised
    pub ordering_tolerance: f64,
    pub n_threads: usize,
    /// Fail the whole load when any stream reports an error
    pub all_or_nothing: bool,
    /// Which time range bounds are inclusive, for ranges that do not say
    pub inclusive: Inclusive,
    /// Only read epoch directories whose names match this pattern (`*` and `?` wildcards)
    pub epoch: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            ordering_tolerance: 0.0,
            n_threads: 1,
            all_or_nothing: false,
            inclusive: Inclusive::Left,
            epoch: None,
        }
    }
}

impl LoadConfig {
    /// Read the configuration in a YAML file
    /// Returns a LoadConfig if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_n_threads_valid() {
            return Err(ConfigError::BadThreadCount(self.n_threads));
        }
        if !self.ordering_tolerance.is_finite() || self.ordering_tolerance < 0.0 {
            return Err(ConfigError::BadTolerance(self.ordering_tolerance));
        }
        Ok(())
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    /// The ordering tolerance in nanoseconds
    pub fn tolerance_nanos(&self) -> i64 {
        (self.ordering_tolerance * NANOS_PER_SECOND as f64).round() as i64
    }
}
