//! Configuration for the framelimits agent.

use crate::core::bounds::BoundFormula;
use crate::core::extract::BadSamplePolicy;
use crate::historian::{PopulationMode, WindowSelector, WriteMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One derived output series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundOutput {
    /// Attribute path the series is written to
    pub path: String,
    /// Formula applied to each slice's statistics
    pub formula: BoundFormula,
    /// Write mode for this output
    pub write_mode: WriteMode,
}

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Attribute path of the monitored sensor signal
    pub sensor_path: String,

    /// Derived output series, lower/upper control bounds by default
    pub outputs: Vec<BoundOutput>,

    /// Template name the window population is selected from
    pub template: String,

    /// Extended property `(key, value)` filter for the population
    pub extended_property: Option<(String, String)>,

    /// Which part of the matching population to use
    pub population_mode: PopulationMode,

    /// Cap on the number of recent windows, newest first
    pub recent_count: Option<usize>,

    /// Resampling interval in seconds
    pub sample_interval_secs: u64,

    /// Change-feed poll period in seconds
    pub poll_period_secs: u64,

    /// Where bad-quality samples are dropped
    pub bad_sample_policy: BadSamplePolicy,

    /// Historian snapshot file consumed by the host binary
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_path: String::new(),
            outputs: vec![
                BoundOutput {
                    path: String::new(),
                    formula: BoundFormula::MeanMinus3Sigma,
                    write_mode: WriteMode::Insert,
                },
                BoundOutput {
                    path: String::new(),
                    formula: BoundFormula::MeanPlus3Sigma,
                    write_mode: WriteMode::Insert,
                },
            ],
            template: String::new(),
            extended_property: None,
            population_mode: PopulationMode::Recent,
            recent_count: Some(50),
            sample_interval_secs: 1,
            poll_period_secs: 1,
            bad_sample_policy: BadSamplePolicy::default(),
            snapshot_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("framelimits")
            .join("config.json")
    }

    /// Reject configurations the engine cannot start from.
    ///
    /// Missing paths or an empty selector are fatal before the poll loop
    /// starts; the engine never attempts recovery from these.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor_path.is_empty() {
            return Err(ConfigError::Invalid("sensor_path is not set".to_string()));
        }
        if self.template.is_empty() {
            return Err(ConfigError::Invalid("template is not set".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(ConfigError::Invalid("no outputs configured".to_string()));
        }
        if let Some(output) = self.outputs.iter().find(|o| o.path.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "output for {} has no attribute path",
                output.formula
            )));
        }
        if self.sample_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sample_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Window selector assembled from the population settings.
    pub fn selector(&self) -> WindowSelector {
        WindowSelector {
            template: self.template.clone(),
            extended_property: self.extended_property.clone(),
            mode: self.population_mode,
            recent_count: self.recent_count,
        }
    }

    /// Resampling interval.
    pub fn sample_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sample_interval_secs as i64)
    }

    /// Poll period for the reactor loop.
    pub fn poll_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_period_secs)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
