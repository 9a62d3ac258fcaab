//! Checkpoint recorder coupling a storage slot with its remote record

use std::path::Path;

use recorder::{RemoteRecorder, TransportHandle};
use runtime_core::{Error, RecordState, Result};
use storage::{StorageManagerHandle, StorageMetadata, StorageSlot};
use tracing::info;

use crate::record::{CheckpointInfo, CheckpointPayload, CheckpointRecord};

/// Records one checkpoint write on the master.
///
/// The slot is acquired before the record is opened and released before
/// the record is finalized. Both happen on [`CheckpointRecorder::close`],
/// at the end of [`CheckpointRecorder::scope`], or on drop.
pub struct CheckpointRecorder {
    // Field order is drop order: slot release precedes record finalization.
    slot: StorageSlot,
    record: RemoteRecorder<CheckpointRecord>,
}

impl CheckpointRecorder {
    /// Acquire a storage slot, then open the checkpoint record.
    ///
    /// # Errors
    /// A storage failure returns before anything is sent to the master. A
    /// failure to open the record releases the slot before returning.
    pub fn open(
        storage: StorageManagerHandle,
        transport: TransportHandle,
        subject: CheckpointRecord,
    ) -> Result<Self> {
        let mut slot = StorageSlot::acquire(storage)?;
        let record = match RemoteRecorder::open(transport, subject) {
            Ok(record) => record,
            Err(e) => {
                return Err(match slot.release_quietly() {
                    Ok(()) => e,
                    Err(teardown) => Error::teardown(e, teardown),
                });
            }
        };

        Ok(Self { slot, record })
    }

    /// Storage id the checkpoint is written under
    pub fn storage_id(&self) -> &str {
        self.slot.storage_id()
    }

    /// Directory to write checkpoint files into
    pub fn path(&self) -> &Path {
        self.slot.path()
    }

    pub fn subject(&self) -> &CheckpointRecord {
        self.record.subject()
    }

    pub fn state(&self) -> RecordState {
        self.record.state()
    }

    /// Report the checkpoint as completed.
    ///
    /// Lists the slot's directory into a resource manifest, sends it with the
    /// framework and format tags, and returns what was sent.
    pub fn complete(&mut self, info: &CheckpointInfo) -> Result<CheckpointPayload> {
        let metadata = StorageMetadata::from_slot(self.slot.handle())?;
        let payload = CheckpointPayload::new(
            metadata,
            info,
            &self.record.subject().client_version,
        );

        self.record.complete(&payload)?;
        info!(
            storage_id = %payload.uuid,
            size_bytes = payload.size_bytes(),
            files = payload.resources.len(),
            "Checkpoint completed"
        );
        Ok(payload)
    }

    /// Report the checkpoint as errored without closing the scope
    pub fn fail(&mut self) -> Result<()> {
        self.record.fail()
    }

    /// Release the slot, then finalize the record.
    ///
    /// The record is finalized even when the release fails.
    pub fn close(self) -> Result<()> {
        let Self { mut slot, record } = self;

        let released = slot.release_quietly();
        let closed = record.close();
        match (released, closed) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(release), Err(close)) => Err(Error::teardown(release, close)),
        }
    }

    /// Run `body` inside the checkpoint scope and close it afterwards
    pub fn scope<T>(mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outcome = body(&mut self);
        let teardown = self.close();
        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(cause), Err(e)) => Err(Error::teardown(cause, e)),
        }
    }
}
