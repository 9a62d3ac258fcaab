//! Training and validation metric records
//!
//! Both kinds share one payload shape, `{"metrics": {...}}`, and differ only
//! in their identifying fields and endpoint. Metric values are normalized to
//! plain JSON before they are sent.

use std::collections::BTreeMap;
use std::fmt;

use runtime_core::{Error, ExperimentId, NonFinitePolicy, Result, StepId, TrialId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::record::{RecordKind, RemoteRecorder};

/// A metric value as produced by training code
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<MetricValue>),
    Map(BTreeMap<String, MetricValue>),
}

/// Metric name -> value
pub type Metrics = BTreeMap<String, MetricValue>;

impl MetricValue {
    /// Convert to plain JSON under the given policy for NaN and infinities
    pub fn normalize(&self, policy: NonFinitePolicy) -> Result<Value> {
        self.normalize_at("", policy)
    }

    fn normalize_at(&self, path: &str, policy: NonFinitePolicy) -> Result<Value> {
        Ok(match self {
            MetricValue::Null => Value::Null,
            MetricValue::Bool(b) => Value::Bool(*b),
            MetricValue::Int(i) => Value::from(*i),
            MetricValue::UInt(u) => Value::from(*u),
            MetricValue::Float(f) => normalize_float(path, *f, policy)?,
            MetricValue::Text(s) => Value::String(s.clone()),
            MetricValue::List(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.normalize_at(&format!("{}[{}]", path, i), policy))
                    .collect::<Result<Vec<_>>>()?,
            ),
            MetricValue::Map(entries) => Value::Object(normalize_entries(path, entries, policy)?),
        })
    }
}

fn normalize_float(path: &str, value: f64, policy: NonFinitePolicy) -> Result<Value> {
    if let Some(number) = Number::from_f64(value) {
        return Ok(Value::Number(number));
    }

    match policy {
        NonFinitePolicy::Reject => Err(Error::Serialization(format!(
            "metric `{}` is not a finite number: {}",
            path, value
        ))),
        NonFinitePolicy::Stringify => {
            let text = if value.is_nan() {
                "NaN"
            } else if value.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            Ok(Value::String(text.to_string()))
        }
    }
}

fn normalize_entries(
    prefix: &str,
    entries: &BTreeMap<String, MetricValue>,
    policy: NonFinitePolicy,
) -> Result<Map<String, Value>> {
    entries
        .iter()
        .map(|(name, value)| {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            Ok((name.clone(), value.normalize_at(&path, policy)?))
        })
        .collect()
}

/// Normalize a whole metrics mapping
pub fn normalize_metrics(metrics: &Metrics, policy: NonFinitePolicy) -> Result<Map<String, Value>> {
    normalize_entries("", metrics, policy)
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Int(i64::from(v))
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::UInt(u64::from(v))
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::UInt(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::UInt(v as u64)
    }
}

impl From<f32> for MetricValue {
    // Go through the shortest decimal form so 0.1f32 reports as 0.1
    fn from(v: f32) -> Self {
        if v.is_finite() {
            MetricValue::Float(v.to_string().parse().unwrap_or(f64::from(v)))
        } else {
            MetricValue::Float(f64::from(v))
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl<T: Into<MetricValue>> From<Vec<T>> for MetricValue {
    fn from(v: Vec<T>) -> Self {
        MetricValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(MetricValue::Null, Into::into)
    }
}

impl From<Value> for MetricValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => MetricValue::Null,
            Value::Bool(b) => MetricValue::Bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    MetricValue::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    MetricValue::Int(i)
                } else {
                    MetricValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => MetricValue::Text(s),
            Value::Array(items) => MetricValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                MetricValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Body fields carried by completed and errored metric records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub metrics: Map<String, Value>,
}

impl MetricsPayload {
    /// Normalize `metrics` into a payload
    pub fn from_metrics(metrics: &Metrics, policy: NonFinitePolicy) -> Result<Self> {
        Ok(Self {
            metrics: normalize_metrics(metrics, policy)?,
        })
    }
}

/// Identifies the training metrics of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingMetricsRecord {
    pub experiment_id: ExperimentId,
    pub trial_id: TrialId,
    pub step_id: StepId,
    pub start_batch: u64,
    pub end_batch: u64,
}

impl fmt::Display for TrainingMetricsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "for trial {} step {} batch {} to {}",
            self.trial_id, self.step_id, self.start_batch, self.end_batch
        )
    }
}

impl RecordKind for TrainingMetricsRecord {
    const NAME: &'static str = "training metrics";
    const ENDPOINT: &'static str = "/api/v1/training_metrics";
    const ENVELOPE: &'static str = "training_metrics";
    type Payload = MetricsPayload;
    type Errored = MetricsPayload;

    fn errored_details(&self) -> MetricsPayload {
        MetricsPayload::default()
    }
}

/// Identifies the validation metrics computed after `total_batches`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMetricsRecord {
    pub experiment_id: ExperimentId,
    pub trial_id: TrialId,
    pub total_batches: u64,
}

impl fmt::Display for ValidationMetricsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "for trial {} batch {}", self.trial_id, self.total_batches)
    }
}

impl RecordKind for ValidationMetricsRecord {
    const NAME: &'static str = "validation metrics";
    const ENDPOINT: &'static str = "/api/v1/validation_metrics";
    const ENVELOPE: &'static str = "validation_metrics";
    type Payload = MetricsPayload;
    type Errored = MetricsPayload;

    fn errored_details(&self) -> MetricsPayload {
        MetricsPayload::default()
    }
}

pub type TrainingMetricsRecorder = RemoteRecorder<TrainingMetricsRecord>;
pub type ValidationMetricsRecorder = RemoteRecorder<ValidationMetricsRecord>;

impl<K: RecordKind<Payload = MetricsPayload>> RemoteRecorder<K> {
    /// Normalize `metrics` and report the record as completed.
    ///
    /// A value that cannot be normalized fails with `Serialization` before
    /// anything is sent; the record stays active and is reported as errored
    /// when the scope closes.
    pub fn complete_metrics(&mut self, metrics: &Metrics, policy: NonFinitePolicy) -> Result<()> {
        let payload = MetricsPayload::from_metrics(metrics, policy)?;
        self.complete(&payload)
    }
}
