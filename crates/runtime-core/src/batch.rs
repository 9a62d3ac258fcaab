//! Batch-size partitioning across the slots of a trial

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::Hyperparameters;
use crate::{Error, Result};

/// Hyperparameter holding the user's global batch size
pub const GLOBAL_BATCH_SIZE_HPARAM: &str = "global_batch_size";

/// Legacy hyperparameter name that is ignored in favor of `global_batch_size`
pub const LEGACY_BATCH_SIZE_HPARAM: &str = "batch_size";

/// Per-worker and effective global batch size for one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizePartition {
    per_slot_batch_size: u64,
    global_batch_size: u64,
    requested_global_batch_size: u64,
}

impl BatchSizePartition {
    /// Derive batch sizes from the hyperparameters and the trial topology.
    ///
    /// With native parallelism the global batch size is used unchanged for
    /// every worker. Otherwise it is split evenly across `slots_per_trial`,
    /// rounding down; a rounded result is logged as a warning.
    ///
    /// # Errors
    /// `InvalidConfig` if `global_batch_size` is missing, not an integer, or
    /// smaller than the number of slots.
    pub fn compute(
        hparams: &Hyperparameters,
        slots_per_trial: u32,
        native_parallel: bool,
    ) -> Result<Self> {
        let value = hparams
            .get(GLOBAL_BATCH_SIZE_HPARAM)
            .ok_or_else(|| Error::InvalidConfig {
                message: "Please specify `global_batch_size` under `hyperparameters` \
                          in experiment config."
                    .to_string(),
            })?;

        if hparams.contains_key(LEGACY_BATCH_SIZE_HPARAM) {
            warn!(
                "Use `global_batch_size` not `batch_size` under `hyperparameters` \
                 in experiment config."
            );
        }

        let global_batch_size = integer_hparam(value)?;

        if native_parallel {
            return Ok(Self {
                per_slot_batch_size: global_batch_size,
                global_batch_size,
                requested_global_batch_size: global_batch_size,
            });
        }

        let slots = u64::from(slots_per_trial);
        if slots == 0 {
            return Err(Error::InvalidConfig {
                message: "slots_per_trial must be at least 1".to_string(),
            });
        }

        if global_batch_size < slots {
            return Err(Error::InvalidConfig {
                message: format!(
                    "Please set the `global_batch_size` hyperparameter to be greater or equal \
                     to the number of slots. Current batch_size: {}, slots_per_trial: {}.",
                    global_batch_size, slots_per_trial
                ),
            });
        }

        let per_slot_batch_size = global_batch_size / slots;
        let effective = per_slot_batch_size * slots;
        if effective != global_batch_size {
            warn!(
                requested = global_batch_size,
                effective,
                slots_per_trial,
                "`global_batch_size` changed from {} to {} to divide equally across {} slots",
                global_batch_size,
                effective,
                slots_per_trial
            );
        }

        Ok(Self {
            per_slot_batch_size,
            global_batch_size: effective,
            requested_global_batch_size: global_batch_size,
        })
    }

    /// Batch size each worker processes per step
    pub fn per_slot_batch_size(&self) -> u64 {
        self.per_slot_batch_size
    }

    /// Effective batch size summed over all slots
    pub fn global_batch_size(&self) -> u64 {
        self.global_batch_size
    }

    /// The value the user asked for before rounding
    pub fn requested_global_batch_size(&self) -> u64 {
        self.requested_global_batch_size
    }

    /// True when the requested size was rounded down to divide evenly
    pub fn was_rounded(&self) -> bool {
        self.global_batch_size != self.requested_global_batch_size
    }
}

fn integer_hparam(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) if n.is_u64() => Ok(n.as_u64().unwrap_or_default()),
        Value::Number(n) if n.is_i64() => Err(Error::InvalidConfig {
            message: format!("`global_batch_size` hparam must be positive, got {}", n),
        }),
        other => Err(Error::InvalidConfig {
            message: format!("`global_batch_size` hparam must be an int, got {}", other),
        }),
    }
}
