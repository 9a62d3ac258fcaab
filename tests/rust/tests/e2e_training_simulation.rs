//! End-to-end training simulation test
//!
//! Simulates a worker running a trial against the in-process master:
//! - Context construction and batch size partitioning
//! - Training metrics for every step
//! - Validation after the last step
//! - A checkpoint written into a shared-filesystem slot
//! - Failure and panic paths that must never leave records active

use anyhow::Result;
use checkpoint::{CheckpointInfo, CheckpointRecord, CheckpointRecorder};
use recorder::{
    InMemoryMaster, Method, Metrics, RecordKind, TrainingMetricsRecord, TrainingMetricsRecorder,
    ValidationMetricsRecord, ValidationMetricsRecorder,
};
use runtime_core::telemetry::try_init_tracing;
use runtime_core::{
    Error, ExperimentConfig, Hyperparameters, NonFinitePolicy, RecordState, RecorderConfig,
    WorkerContext,
};
use serde_json::json;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use storage::{SharedFsStorage, StorageManager};
use tempfile::TempDir;

const STEPS: u64 = 3;
const BATCHES_PER_STEP: u64 = 100;

/// A worker for one trial, wired to an in-process master and a temp directory
struct SimulatedWorker {
    ctx: WorkerContext,
    config: RecorderConfig,
    master: Arc<InMemoryMaster>,
    storage: Arc<SharedFsStorage>,
    _temp_dir: TempDir,
}

impl SimulatedWorker {
    fn new() -> Result<Self> {
        try_init_tracing("recorder=debug,checkpoint=debug,storage=debug");

        let config = ExperimentConfig::from_json_str(
            r#"{
                "resources": {"slots_per_trial": 4},
                "data": {"url": "s3://bucket/train"}
            }"#,
        )?;
        let mut hparams = Hyperparameters::new();
        hparams.insert("global_batch_size".to_string(), json!(66));
        hparams.insert("learning_rate".to_string(), json!(0.001));

        let temp_dir = TempDir::new()?;
        let recorder_config = RecorderConfig::from_json_str(
            &json!({
                "master": {"address": "127.0.0.1", "port": 8080},
                "storage": {"base_path": temp_dir.path()},
                "metrics": {"non_finite": "stringify"}
            })
            .to_string(),
        )?;

        let ctx = WorkerContext::builder(config, hparams)
            .master(recorder_config.master.clone())
            .experiment_id(42)
            .trial_id(7)
            .slot_ids(vec![0, 1, 2, 3])
            .test_mode(true)
            .build()?;

        Ok(Self {
            storage: Arc::new(SharedFsStorage::from_config(&recorder_config.storage)),
            ctx,
            config: recorder_config,
            master: Arc::new(InMemoryMaster::new()),
            _temp_dir: temp_dir,
        })
    }

    fn training_record(&self, step_id: u64) -> TrainingMetricsRecord {
        TrainingMetricsRecord {
            experiment_id: self.ctx.experiment_id(),
            trial_id: self.ctx.trial_id(),
            step_id,
            start_batch: (step_id - 1) * BATCHES_PER_STEP,
            end_batch: step_id * BATCHES_PER_STEP,
        }
    }

    fn train_step(&self, step_id: u64) -> runtime_core::Result<()> {
        TrainingMetricsRecorder::open(self.master.clone(), self.training_record(step_id))?.scope(
            |record| {
                let mut metrics = Metrics::new();
                metrics.insert("loss".to_string(), (1.0 / step_id as f64).into());
                metrics.insert(
                    "batch_losses".to_string(),
                    vec![0.5f64, 0.25, f64::NAN].into(),
                );
                record.complete_metrics(&metrics, self.config.metrics.non_finite)
            },
        )
    }

    fn validate(&self, total_batches: u64) -> runtime_core::Result<()> {
        let subject = ValidationMetricsRecord {
            experiment_id: self.ctx.experiment_id(),
            trial_id: self.ctx.trial_id(),
            total_batches,
        };
        ValidationMetricsRecorder::open(self.master.clone(), subject)?.scope(|record| {
            let mut metrics = Metrics::new();
            metrics.insert("accuracy".to_string(), 0.93f64.into());
            metrics.insert("validation_loss".to_string(), 0.12f64.into());
            record.complete_metrics(&metrics, self.config.metrics.non_finite)
        })
    }

    fn checkpoint(&self, batch_number: u64) -> runtime_core::Result<checkpoint::CheckpointPayload> {
        let subject = CheckpointRecord::from_context(&self.ctx, batch_number)
            .with_client_version(self.config.client_version.clone());
        CheckpointRecorder::open(self.storage.clone(), self.master.clone(), subject)?.scope(
            |ckpt| {
                std::fs::create_dir(ckpt.path().join("optimizer"))?;
                std::fs::write(ckpt.path().join("model.bin"), vec![1u8; 4096])?;
                std::fs::write(ckpt.path().join("optimizer").join("state.bin"), vec![2u8; 512])?;
                ckpt.complete(&CheckpointInfo::new("torch", "pickle"))
            },
        )
    }

    fn assert_nothing_active(&self) {
        for endpoint in [
            TrainingMetricsRecord::ENDPOINT,
            ValidationMetricsRecord::ENDPOINT,
            CheckpointRecord::ENDPOINT,
        ] {
            assert!(
                self.master.active_records(endpoint).is_empty(),
                "records left active under {}",
                endpoint
            );
        }
        assert_eq!(self.storage.outstanding_slots(), 0);
    }
}

#[test]
fn test_full_trial() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    assert_eq!(worker.ctx.per_slot_batch_size(), 16);
    assert_eq!(worker.ctx.global_batch_size(), 64);
    assert_eq!(worker.ctx.data_config()["url"], "s3://bucket/train");
    assert_eq!(worker.ctx.unary_host(), "http://127.0.0.1:8080");
    assert_eq!(worker.config.metrics.non_finite, NonFinitePolicy::Stringify);

    for step_id in 1..=STEPS {
        worker.train_step(step_id)?;
    }
    worker.validate(STEPS * BATCHES_PER_STEP)?;
    let payload = worker.checkpoint(STEPS * BATCHES_PER_STEP)?;

    let requests = worker.master.requests();
    let posts = requests.iter().filter(|r| r.method == Method::Post).count();
    let puts = requests.iter().filter(|r| r.method == Method::Put).count();
    assert_eq!(posts, STEPS as usize + 2);
    assert_eq!(puts, STEPS as usize + 2);
    worker.assert_nothing_active();

    let training = worker.master.records(TrainingMetricsRecord::ENDPOINT);
    assert_eq!(training.len(), STEPS as usize);
    for record in &training {
        assert_eq!(record.state, RecordState::Completed);
        assert_eq!(record.body["metrics"]["batch_losses"][2], "NaN");
        assert!(record.body["end_time"].is_string());
    }

    let validation = worker.master.records(ValidationMetricsRecord::ENDPOINT);
    assert_eq!(validation.len(), 1);
    assert_eq!(validation[0].body["total_batches"], 300);
    assert_eq!(validation[0].body["metrics"]["accuracy"], 0.93);

    let checkpoints = worker.master.records(CheckpointRecord::ENDPOINT);
    assert_eq!(checkpoints.len(), 1);
    let body = &checkpoints[0].body;
    assert_eq!(body["state"], "STATE_COMPLETED");
    assert_eq!(body["uuid"], json!(payload.uuid));
    assert_eq!(body["resources"]["model.bin"], 4096);
    assert_eq!(body["resources"]["optimizer/"], 0);
    assert_eq!(body["resources"]["optimizer/state.bin"], 512);
    assert_eq!(body["hparams"]["learning_rate"], 0.001);
    assert_eq!(body["experiment_config"]["resources"]["slots_per_trial"], 4);
    assert_eq!(payload.size_bytes(), 4608);

    // The checkpoint remains on the shared filesystem after its slot is released
    let restored = worker.storage.restore_path(&payload.uuid)?;
    assert!(restored.join("model.bin").exists());
    Ok(())
}

#[test]
fn test_rejected_metrics_report_leaves_no_active_records() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    worker.train_step(1)?;

    worker
        .master
        .reject_next(Method::Put, TrainingMetricsRecord::ENDPOINT, "503 Service Unavailable");
    let result = worker.train_step(2);
    assert!(matches!(result, Err(Error::RemoteWrite { .. })));

    worker.train_step(3)?;
    worker.assert_nothing_active();

    let states: Vec<_> = worker
        .master
        .records(TrainingMetricsRecord::ENDPOINT)
        .into_iter()
        .map(|r| (r.body["step_id"].as_u64(), r.state))
        .collect();
    assert!(states.contains(&(Some(2), RecordState::Errored)));
    assert!(states.contains(&(Some(1), RecordState::Completed)));
    assert!(states.contains(&(Some(3), RecordState::Completed)));
    Ok(())
}

#[test]
fn test_failed_open_sends_no_update() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    worker
        .master
        .reject_next(Method::Post, ValidationMetricsRecord::ENDPOINT, "500 Internal Server Error");

    let result = worker.validate(10);
    assert!(matches!(result, Err(Error::RemoteWrite { .. })));
    assert_eq!(
        worker
            .master
            .requests_with(Method::Put, ValidationMetricsRecord::ENDPOINT)
            .len(),
        0
    );
    assert!(worker
        .master
        .records(ValidationMetricsRecord::ENDPOINT)
        .is_empty());
    Ok(())
}

#[test]
fn test_panic_during_checkpoint_reports_errored() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    let subject = CheckpointRecord::from_context(&worker.ctx, 50);
    let storage = worker.storage.clone();
    let master = worker.master.clone();

    let outcome = catch_unwind(AssertUnwindSafe(move || {
        let _ckpt = CheckpointRecorder::open(storage, master, subject).unwrap();
        panic!("writer crashed mid-checkpoint");
    }));
    assert!(outcome.is_err());

    worker.assert_nothing_active();
    let checkpoints = worker.master.records(CheckpointRecord::ENDPOINT);
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].state, RecordState::Errored);
    assert!(checkpoints[0].body.get("format").is_none());
    assert!(checkpoints[0].body["client_version"].is_string());
    Ok(())
}

#[test]
fn test_checkpoint_writer_error_releases_slot() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    let subject = CheckpointRecord::from_context(&worker.ctx, 100);

    let result: runtime_core::Result<()> =
        CheckpointRecorder::open(worker.storage.clone(), worker.master.clone(), subject)?
            .scope(|ckpt| {
                std::fs::write(ckpt.path().join("partial.bin"), b"half")?;
                Err(Error::Storage {
                    message: "disk quota exceeded".to_string(),
                })
            });

    assert!(matches!(result, Err(Error::Storage { .. })));
    worker.assert_nothing_active();
    Ok(())
}

#[test]
fn test_master_down_for_teardown_combines_errors() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    let recorder = TrainingMetricsRecorder::open(worker.master.clone(), worker.training_record(1))?;
    worker
        .master
        .reject_always(Method::Put, TrainingMetricsRecord::ENDPOINT, "connection refused");

    let result: runtime_core::Result<()> = recorder.scope(|_| {
        Err(Error::InvalidConfig {
            message: "bad metric".to_string(),
        })
    });

    match result {
        Err(Error::Teardown { cause, teardown }) => {
            assert!(matches!(*cause, Error::InvalidConfig { .. }));
            assert!(matches!(*teardown, Error::RemoteWrite { .. }));
        }
        other => panic!("expected teardown error, got {:?}", other),
    }

    // The master never heard a terminal state, so it still holds the record
    assert_eq!(
        worker
            .master
            .active_records(TrainingMetricsRecord::ENDPOINT)
            .len(),
        1
    );
    Ok(())
}

#[test]
fn test_timestamps_are_ordered() -> Result<()> {
    let worker = SimulatedWorker::new()?;
    worker.train_step(1)?;

    let record = &worker.master.records(TrainingMetricsRecord::ENDPOINT)[0];
    let parse = |field: &str| {
        chrono::DateTime::parse_from_rfc3339(record.body[field].as_str().unwrap()).unwrap()
    };
    assert!(parse("end_time") >= parse("start_time"));
    assert!(record.body["start_time"].as_str().unwrap().ends_with('Z'));
    Ok(())
}
