//! Playground configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "coordinator": { "debounceMs": 150, "historyCapacity": 20 },
//!   "executor": { "kmeansProgressEvery": 1 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::coordinator::CoordinatorConfig;
use crate::executor::ExecutorConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value {field}: {message}")]
    Invalid {
        field: &'static str,
        message: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaygroundConfig {
    pub coordinator: CoordinatorConfig,
    pub executor: ExecutorConfig,
}

impl PlaygroundConfig {
    /// Read and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coordinator.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "coordinator.historyCapacity",
                message: "must be at least 1",
            });
        }
        let cadences = [
            ("executor.kmeansProgressEvery", self.executor.kmeans_progress_every),
            ("executor.dbscanProgressEvery", self.executor.dbscan_progress_every),
            (
                "executor.hierarchicalProgressEvery",
                self.executor.hierarchical_progress_every,
            ),
        ];
        for (field, every) in cadences {
            if every == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be at least 1",
                });
            }
        }
        Ok(())
    }
}
