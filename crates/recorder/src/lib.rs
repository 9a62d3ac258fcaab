//! Lifecycle records reported to the master
//!
//! This crate provides:
//! - **Transport seam**: [`MasterTransport`] with an explicit
//!   acknowledged/rejected response
//! - **Scoped records**: [`RemoteRecorder`], which always leaves its record
//!   completed or errored on the master
//! - **Metric records**: training and validation kinds plus normalization of
//!   metric values to plain JSON
//! - **Test mode**: [`InMemoryMaster`], an in-process master
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use recorder::{InMemoryMaster, Metrics, TrainingMetricsRecord, TrainingMetricsRecorder};
//! use runtime_core::NonFinitePolicy;
//!
//! # fn main() -> runtime_core::Result<()> {
//! let master = Arc::new(InMemoryMaster::new());
//! let subject = TrainingMetricsRecord {
//!     experiment_id: 1,
//!     trial_id: 7,
//!     step_id: 3,
//!     start_batch: 200,
//!     end_batch: 300,
//! };
//!
//! TrainingMetricsRecorder::open(master.clone(), subject)?.scope(|record| {
//!     let mut metrics = Metrics::new();
//!     metrics.insert("loss".to_string(), 0.42f64.into());
//!     record.complete_metrics(&metrics, NonFinitePolicy::Stringify)
//! })?;
//! # Ok(())
//! # }
//! ```

mod master;
mod metrics;
mod record;
mod transport;

pub use master::{InMemoryMaster, StoredRecord};
pub use metrics::{
    normalize_metrics, MetricValue, Metrics, MetricsPayload, TrainingMetricsRecord,
    TrainingMetricsRecorder, ValidationMetricsRecord, ValidationMetricsRecorder,
};
pub use record::{RecordKind, RemoteRecorder};
pub use transport::{MasterRequest, MasterResponse, MasterTransport, Method, TransportHandle};
