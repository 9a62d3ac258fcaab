//! Runtime Core - Foundation for training-worker lifecycle recording
//!
//! Provides the shared error type, configuration, record types, and the
//! batch-size partitioning performed when a worker context is built.

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod telemetry;
pub mod types;

pub use batch::BatchSizePartition;
pub use config::{
    ExperimentConfig, MasterConfig, MetricsConfig, NonFinitePolicy, RecorderConfig, StorageConfig,
};
pub use context::{WorkerContext, WorkerContextBuilder};
pub use error::{Error, Result};
pub use types::*;
