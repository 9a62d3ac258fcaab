//! Per-trial worker context

use serde_json::Value;
use tracing::warn;

use crate::batch::{BatchSizePartition, GLOBAL_BATCH_SIZE_HPARAM};
use crate::config::{ExperimentConfig, MasterConfig};
use crate::types::{ExperimentId, Hyperparameters, TrialId};
use crate::{Error, Result};

/// First port of the fallback rendezvous pair used outside a cluster
pub const LOCAL_RENDEZVOUS_PORT: u16 = 29400;

/// Immutable description of the trial a worker is running.
///
/// Batch sizes are partitioned once at construction and never change.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    master: MasterConfig,
    experiment_id: ExperimentId,
    trial_id: TrialId,
    trial_seed: u64,
    hparams: Hyperparameters,
    experiment_config: ExperimentConfig,
    slot_ids: Vec<u32>,
    latest_checkpoint: Option<Value>,
    rendezvous_ports: String,
    test_mode: bool,
    batch_sizes: BatchSizePartition,
}

impl WorkerContext {
    /// Start building a context for the given trial
    pub fn builder(experiment_config: ExperimentConfig, hparams: Hyperparameters) -> WorkerContextBuilder {
        WorkerContextBuilder::new(experiment_config, hparams)
    }

    pub fn master(&self) -> &MasterConfig {
        &self.master
    }

    /// Base URL for unary requests to the master
    pub fn unary_host(&self) -> String {
        self.master.unary_host()
    }

    pub fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    pub fn trial_id(&self) -> TrialId {
        self.trial_id
    }

    pub fn trial_seed(&self) -> u64 {
        self.trial_seed
    }

    pub fn experiment_config(&self) -> &ExperimentConfig {
        &self.experiment_config
    }

    /// The `data` section of the experiment configuration
    pub fn data_config(&self) -> Value {
        self.experiment_config.data_config()
    }

    pub fn slot_ids(&self) -> &[u32] {
        &self.slot_ids
    }

    pub fn latest_checkpoint(&self) -> Option<&Value> {
        self.latest_checkpoint.as_ref()
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn hparams(&self) -> &Hyperparameters {
        &self.hparams
    }

    /// Look up a single hyperparameter
    pub fn get_hparam(&self, name: &str) -> Result<&Value> {
        let value = self
            .hparams
            .get(name)
            .ok_or_else(|| Error::HyperparameterNotFound {
                name: name.to_string(),
            })?;

        if name == GLOBAL_BATCH_SIZE_HPARAM {
            warn!(
                "Please use `per_slot_batch_size()` and `global_batch_size()` instead of \
                 accessing `global_batch_size` directly."
            );
        }

        Ok(value)
    }

    pub fn batch_sizes(&self) -> &BatchSizePartition {
        &self.batch_sizes
    }

    pub fn per_slot_batch_size(&self) -> u64 {
        self.batch_sizes.per_slot_batch_size()
    }

    pub fn global_batch_size(&self) -> u64 {
        self.batch_sizes.global_batch_size()
    }

    /// The two rendezvous ports for distributed training setup
    pub fn rendezvous_ports(&self) -> (u16, u16) {
        let ports = self
            .rendezvous_ports
            .split(',')
            .map(|p| p.trim().parse::<u16>())
            .collect::<std::result::Result<Vec<_>, _>>();

        match ports.as_deref() {
            Ok([first, second]) => (*first, *second),
            _ => {
                warn!(
                    configured = %self.rendezvous_ports,
                    "Rendezvous ports not set, falling back on local rendezvous ports"
                );
                (LOCAL_RENDEZVOUS_PORT, LOCAL_RENDEZVOUS_PORT + 1)
            }
        }
    }
}

/// Builder for WorkerContext
pub struct WorkerContextBuilder {
    master: MasterConfig,
    experiment_id: ExperimentId,
    trial_id: TrialId,
    trial_seed: u64,
    hparams: Hyperparameters,
    experiment_config: ExperimentConfig,
    slot_ids: Vec<u32>,
    latest_checkpoint: Option<Value>,
    rendezvous_ports: String,
    test_mode: bool,
}

impl WorkerContextBuilder {
    pub fn new(experiment_config: ExperimentConfig, hparams: Hyperparameters) -> Self {
        Self {
            master: MasterConfig::default(),
            experiment_id: 0,
            trial_id: 0,
            trial_seed: 0,
            hparams,
            experiment_config,
            slot_ids: Vec::new(),
            latest_checkpoint: None,
            rendezvous_ports: String::new(),
            test_mode: false,
        }
    }

    pub fn master(mut self, master: MasterConfig) -> Self {
        self.master = master;
        self
    }

    pub fn experiment_id(mut self, id: ExperimentId) -> Self {
        self.experiment_id = id;
        self
    }

    pub fn trial_id(mut self, id: TrialId) -> Self {
        self.trial_id = id;
        self
    }

    pub fn trial_seed(mut self, seed: u64) -> Self {
        self.trial_seed = seed;
        self
    }

    pub fn slot_ids(mut self, slot_ids: Vec<u32>) -> Self {
        self.slot_ids = slot_ids;
        self
    }

    pub fn latest_checkpoint(mut self, checkpoint: Option<Value>) -> Self {
        self.latest_checkpoint = checkpoint;
        self
    }

    /// Comma-separated pair of ports, e.g. `"1734,1750"`
    pub fn rendezvous_ports(mut self, ports: impl Into<String>) -> Self {
        self.rendezvous_ports = ports.into();
        self
    }

    pub fn test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// Build the context, partitioning the batch size across slots
    pub fn build(self) -> Result<WorkerContext> {
        let batch_sizes = BatchSizePartition::compute(
            &self.hparams,
            self.experiment_config.slots_per_trial(),
            self.experiment_config.native_parallel_enabled(),
        )?;

        Ok(WorkerContext {
            master: self.master,
            experiment_id: self.experiment_id,
            trial_id: self.trial_id,
            trial_seed: self.trial_seed,
            hparams: self.hparams,
            experiment_config: self.experiment_config,
            slot_ids: self.slot_ids,
            latest_checkpoint: self.latest_checkpoint,
            rendezvous_ports: self.rendezvous_ports,
            test_mode: self.test_mode,
            batch_sizes,
        })
    }
}
