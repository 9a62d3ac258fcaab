//! Core type definitions shared by the recorders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier types
pub type ExperimentId = u64;
pub type TrialId = u64;
pub type StepId = u64;
pub type StorageId = String;

/// Training batch counter
pub type BatchNumber = u64;

/// Hyperparameter mapping as supplied by the experiment configuration
pub type Hyperparameters = serde_json::Map<String, serde_json::Value>;

/// Version tag attached to every terminal record
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire format for every `start_time`/`end_time` field
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Lifecycle state of a remote record
///
/// Transitions only move forward: `Active -> Completed` or `Active -> Errored`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Record opened, work in progress
    #[serde(rename = "STATE_ACTIVE")]
    Active,

    /// Work finished and its results were accepted by the master
    #[serde(rename = "STATE_COMPLETED")]
    Completed,

    /// Work failed or was abandoned
    #[serde(rename = "STATE_ERRORED")]
    Errored,
}

impl RecordState {
    /// Returns true once no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordState::Completed | RecordState::Errored)
    }

    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Active => "STATE_ACTIVE",
            RecordState::Completed => "STATE_COMPLETED",
            RecordState::Errored => "STATE_ERRORED",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a timestamp as `YYYY-MM-DDTHH:MM:SS.ffffffZ`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Serde helper emitting UTC timestamps with microsecond precision
pub mod utc_micros {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    /// Same encoding for optional timestamps
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match ts {
                Some(ts) => super::serialize(ts, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] DateTime<Utc>);

            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(ts)| ts))
        }
    }
}
