//! Checkpoint record kind and payloads

use std::fmt;

use recorder::RecordKind;
use runtime_core::{
    BatchNumber, ExperimentId, Hyperparameters, StorageId, TrialId, WorkerContext, CLIENT_VERSION,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storage::{Resources, StorageMetadata};

/// Identifies the checkpoint taken after `batch_number` batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub trial_id: TrialId,
    pub batch_number: BatchNumber,
    pub experiment_id: ExperimentId,
    pub experiment_config: Value,
    pub hparams: Hyperparameters,

    /// Sent only with terminal records
    #[serde(skip)]
    pub client_version: String,
}

impl CheckpointRecord {
    /// Describe a checkpoint of the context's trial
    pub fn from_context(ctx: &WorkerContext, batch_number: BatchNumber) -> Self {
        Self {
            trial_id: ctx.trial_id(),
            batch_number,
            experiment_id: ctx.experiment_id(),
            experiment_config: ctx.experiment_config().raw.clone(),
            hparams: ctx.hparams().clone(),
            client_version: CLIENT_VERSION.to_string(),
        }
    }

    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }
}

impl fmt::Display for CheckpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trial {} batch {}", self.trial_id, self.batch_number)
    }
}

impl RecordKind for CheckpointRecord {
    const NAME: &'static str = "checkpoint";
    const ENDPOINT: &'static str = "/api/v1/checkpoints";
    const ENVELOPE: &'static str = "checkpoint";
    type Payload = CheckpointPayload;
    type Errored = CheckpointErrored;

    fn errored_details(&self) -> CheckpointErrored {
        CheckpointErrored {
            client_version: self.client_version.clone(),
        }
    }
}

/// Framework and format tags supplied by the code that wrote the checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub framework: Option<String>,
    pub format: Option<String>,
}

impl CheckpointInfo {
    pub fn new(framework: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            framework: Some(framework.into()),
            format: Some(format.into()),
        }
    }
}

/// Everything a completed checkpoint record reports about the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    pub uuid: StorageId,
    pub resources: Resources,
    pub metadata: StorageMetadata,
    pub framework: Option<String>,
    pub format: Option<String>,
    pub client_version: String,
}

impl CheckpointPayload {
    pub fn new(metadata: StorageMetadata, info: &CheckpointInfo, client_version: &str) -> Self {
        Self {
            uuid: metadata.storage_id.clone(),
            resources: metadata.resources.clone(),
            metadata,
            framework: info.framework.clone(),
            format: info.format.clone(),
            client_version: client_version.to_string(),
        }
    }

    /// Total bytes written to the checkpoint
    pub fn size_bytes(&self) -> u64 {
        self.metadata.total_size()
    }
}

/// Fields sent with an errored checkpoint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointErrored {
    pub client_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::ExperimentConfig;
    use serde_json::json;

    #[test]
    fn test_from_context() {
        let mut hparams = Hyperparameters::new();
        hparams.insert("global_batch_size".to_string(), json!(32));
        let config =
            ExperimentConfig::from_value(json!({"resources": {"slots_per_trial": 2}})).unwrap();
        let ctx = WorkerContext::builder(config, hparams)
            .experiment_id(9)
            .trial_id(4)
            .build()
            .unwrap();

        let record = CheckpointRecord::from_context(&ctx, 500);
        assert_eq!(record.to_string(), "trial 4 batch 500");
        assert_eq!(record.client_version, CLIENT_VERSION);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["experiment_id"], 9);
        assert_eq!(json["experiment_config"]["resources"]["slots_per_trial"], 2);
        assert_eq!(json["hparams"]["global_batch_size"], 32);
        assert!(json.get("client_version").is_none());
    }

    #[test]
    fn test_payload_fields() {
        let mut resources = Resources::new();
        resources.insert("model.bin".to_string(), 10);
        let metadata = StorageMetadata {
            storage_id: "abc".to_string(),
            resources,
        };

        let payload = CheckpointPayload::new(metadata, &CheckpointInfo::new("torch", "pickle"), "1.2.3");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["uuid"], "abc");
        assert_eq!(json["resources"]["model.bin"], 10);
        assert_eq!(json["metadata"]["uuid"], "abc");
        assert_eq!(json["framework"], "torch");
        assert_eq!(json["format"], "pickle");
        assert_eq!(json["client_version"], "1.2.3");
        assert_eq!(payload.size_bytes(), 10);
    }
}
