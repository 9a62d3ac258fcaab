//! Recorder and experiment configuration types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::types::CLIENT_VERSION;
use crate::{Error, Result};

/// Main recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Master connection settings
    pub master: MasterConfig,

    /// Checkpoint storage settings
    pub storage: StorageConfig,

    /// Metric normalization settings
    pub metrics: MetricsConfig,

    /// Version tag attached to terminal records
    pub client_version: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            master: MasterConfig::default(),
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
            client_version: CLIENT_VERSION.to_string(),
        }
    }
}

impl RecorderConfig {
    /// Parse a JSON configuration document, filling missing fields with defaults
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to parse recorder config: {}", e),
        })
    }
}

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Master host name or address
    pub address: String,

    /// Master port
    pub port: u16,

    /// Use TLS when talking to the master
    pub use_tls: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 8080,
            use_tls: false,
        }
    }
}

impl MasterConfig {
    /// Base URL for unary requests to the master
    pub fn unary_host(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.address, self.port)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the shared filesystem checkpoint store
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./checkpoints"),
        }
    }
}

/// Metric reporting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// How NaN and infinite metric values are reported
    pub non_finite: NonFinitePolicy,
}

/// Treatment of floating special values during metric normalization
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Report as the strings "NaN", "Infinity" and "-Infinity"
    #[default]
    Stringify,

    /// Fail the report with a serialization error
    Reject,
}

/// The slice of the experiment configuration the worker needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Slots participating in each trial
    pub slots_per_trial: u32,

    /// Whether the framework handles parallelism natively
    pub native_parallel: bool,

    /// The full configuration document
    pub raw: Value,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            slots_per_trial: 1,
            native_parallel: false,
            raw: Value::Object(Default::default()),
        }
    }
}

impl ExperimentConfig {
    /// Build from an experiment configuration document
    pub fn from_value(raw: Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(Error::InvalidConfig {
                message: "experiment config must be a JSON object".to_string(),
            });
        }

        let slots_per_trial = match raw.pointer("/resources/slots_per_trial") {
            None | Some(Value::Null) => 1,
            Some(value) => value
                .as_u64()
                .and_then(|slots| u32::try_from(slots).ok())
                .filter(|slots| *slots > 0)
                .ok_or_else(|| Error::InvalidConfig {
                    message: format!(
                        "resources.slots_per_trial must be a positive integer, got {}",
                        value
                    ),
                })?,
        };

        let native_parallel = raw
            .pointer("/internal/native")
            .map_or(false, |native| !native.is_null());

        Ok(Self {
            slots_per_trial,
            native_parallel,
            raw,
        })
    }

    /// Parse an experiment configuration JSON document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to parse experiment config: {}", e),
        })?;
        Self::from_value(value)
    }

    pub fn slots_per_trial(&self) -> u32 {
        self.slots_per_trial
    }

    pub fn native_parallel_enabled(&self) -> bool {
        self.native_parallel
    }

    /// The `data` section, or an empty object
    pub fn data_config(&self) -> Value {
        self.raw
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}
