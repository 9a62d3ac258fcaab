//! Checkpoint recording for training workers
//!
//! Couples a storage slot with a checkpoint record on the master so that
//! every checkpoint ends up completed or errored, and every slot released.

pub mod record;
pub mod recorder;

pub use record::{CheckpointErrored, CheckpointInfo, CheckpointPayload, CheckpointRecord};
pub use recorder::CheckpointRecorder;
