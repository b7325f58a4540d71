//! Configuration module

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// Environment variable naming the JSON config file
pub const CONFIG_ENV: &str = "DISPATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/dispatch.json";

/// Main configuration struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Benchmark settings
    pub bench: BenchConfig,

    /// Queue settings
    pub queues: QueueConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Repetitions per dispatch scenario
    pub iterations: usize,
    /// Untimed invocations before sampling in `run_bench`
    pub warmup_iterations: u64,
    /// Samples collected per `run_bench` baseline
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub concurrent_workers: usize,
    /// Bounded channel capacity, `None` for unbounded
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json_output: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            warmup_iterations: 1_000,
            samples: 100_000,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrent_workers: default_workers(),
            channel_capacity: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_output: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bench: BenchConfig::default(),
            queues: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Worker count for concurrent queues: leave two cores for the caller, keep at least two
pub fn default_workers() -> usize {
    num_cpus::get().saturating_sub(2).max(2)
}

impl Config {
    /// Load config from environment
    pub fn from_env() -> Result<Self> {
        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if std::path::Path::new(&config_path).exists() {
            Self::load(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load config from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.queues.concurrent_workers == 0 {
            return Err(DispatchError::Config(
                "queues.concurrent_workers must be at least 1".to_string(),
            ));
        }
        if self.queues.channel_capacity == Some(0) {
            return Err(DispatchError::Config(
                "queues.channel_capacity must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
