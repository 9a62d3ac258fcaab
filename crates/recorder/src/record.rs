//! Scoped remote records
//!
//! A [`RemoteRecorder`] opens a record on the master in the active state and
//! guarantees that the record reaches a terminal state when the scope ends,
//! however it ends: an explicit [`RemoteRecorder::close`], the end of
//! [`RemoteRecorder::scope`], an early return through `?`, or a panic
//! unwinding through the owner.

use std::fmt;

use chrono::{DateTime, Utc};
use runtime_core::types::utc_micros;
use runtime_core::{Error, RecordState, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::transport::{MasterRequest, MasterResponse, Method, TransportHandle};

/// What distinguishes one kind of record from another.
///
/// Implemented by the subject type, whose fields form the record's
/// identifying key and are sent with every write.
pub trait RecordKind: Serialize + fmt::Display {
    /// Human-readable name used in logs
    const NAME: &'static str;

    /// Resource the record lives under
    const ENDPOINT: &'static str;

    /// Key wrapping the record in request bodies
    const ENVELOPE: &'static str;

    /// Result data sent with a completed record
    type Payload: Serialize;

    /// Fields sent with an errored record
    type Errored: Serialize;

    fn errored_details(&self) -> Self::Errored;
}

#[derive(Serialize)]
struct RecordBody<'a, S: Serialize, D: Serialize> {
    #[serde(flatten)]
    subject: &'a S,
    #[serde(with = "utc_micros")]
    start_time: DateTime<Utc>,
    #[serde(with = "utc_micros::option", skip_serializing_if = "Option::is_none")]
    end_time: Option<DateTime<Utc>>,
    state: RecordState,
    #[serde(flatten)]
    details: Option<&'a D>,
}

/// A record on the master whose lifecycle is tied to this value
pub struct RemoteRecorder<K: RecordKind> {
    transport: TransportHandle,
    subject: K,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    state: RecordState,
    finished: bool,
}

impl<K: RecordKind> RemoteRecorder<K> {
    /// Open the record by sending it to the master in the active state.
    ///
    /// # Errors
    /// `RemoteWrite` if the master does not acknowledge. No record exists
    /// in that case and nothing is sent on drop.
    pub fn open(transport: TransportHandle, subject: K) -> Result<Self> {
        info!("Saving {} {}", K::NAME, subject);

        let mut recorder = Self {
            transport,
            subject,
            start_time: Utc::now(),
            end_time: None,
            state: RecordState::Active,
            finished: true,
        };

        recorder.send::<()>(RecordState::Active, None, None)?;
        recorder.finished = false;
        Ok(recorder)
    }

    pub fn subject(&self) -> &K {
        &self.subject
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Report the record as completed with its results.
    ///
    /// On failure the record stays active, so closing the scope reports it
    /// as errored.
    pub fn complete(&mut self, payload: &K::Payload) -> Result<()> {
        self.expect_active()?;
        info!("Finishing saving {} {}", K::NAME, self.subject);

        let end_time = Utc::now();
        self.send(RecordState::Completed, Some(end_time), Some(payload))?;

        self.state = RecordState::Completed;
        self.end_time = Some(end_time);
        Ok(())
    }

    /// Report the record as errored
    pub fn fail(&mut self) -> Result<()> {
        self.expect_active()?;
        info!("Failed saving {} {}", K::NAME, self.subject);

        let end_time = Utc::now();
        let details = self.subject.errored_details();
        self.send(RecordState::Errored, Some(end_time), Some(&details))?;

        self.state = RecordState::Errored;
        self.end_time = Some(end_time);
        Ok(())
    }

    /// End the scope, reporting the record as errored unless it completed
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    /// Run `body` inside the record's scope and close it afterwards.
    ///
    /// When both `body` and the close fail, the close error is returned
    /// wrapping the body's error.
    pub fn scope<T>(mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outcome = body(&mut self);
        let teardown = self.finish();
        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(cause), Err(e)) => Err(Error::teardown(cause, e)),
        }
    }

    /// Scope-exit logic; runs at most once
    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        match self.state {
            RecordState::Completed | RecordState::Errored => Ok(()),
            RecordState::Active => {
                warn!("{} {} exited scope without completing", K::NAME, self.subject);
                self.fail()
            }
        }
    }

    fn expect_active(&self) -> Result<()> {
        if self.state != RecordState::Active {
            return Err(Error::InvalidRecordState {
                expected: RecordState::Active.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn send<D: Serialize>(
        &self,
        state: RecordState,
        end_time: Option<DateTime<Utc>>,
        details: Option<&D>,
    ) -> Result<()> {
        let method = if state == RecordState::Active {
            Method::Post
        } else {
            Method::Put
        };

        let body = RecordBody {
            subject: &self.subject,
            start_time: self.start_time,
            end_time,
            state,
            details,
        };
        let mut envelope = Map::new();
        envelope.insert(K::ENVELOPE.to_string(), serde_json::to_value(&body)?);

        let request = MasterRequest {
            method,
            endpoint: K::ENDPOINT.to_string(),
            body: Value::Object(envelope),
        };

        match self.transport.send(&request) {
            MasterResponse::Acknowledged { .. } => Ok(()),
            MasterResponse::Rejected { raw } => {
                error!(
                    method = %method,
                    endpoint = K::ENDPOINT,
                    response = %raw,
                    "Master rejected {} {}",
                    K::NAME,
                    self.subject
                );
                Err(Error::RemoteWrite {
                    method: method.to_string(),
                    endpoint: K::ENDPOINT.to_string(),
                    response: raw,
                })
            }
        }
    }
}

impl<K: RecordKind> Drop for RemoteRecorder<K> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            warn!("{} {} dropped during panic", K::NAME, self.subject);
        }
        if let Err(e) = self.finish() {
            error!(
                error = %e,
                "Failed to report {} {} as errored",
                K::NAME,
                self.subject
            );
        }
    }
}

impl<K: RecordKind + fmt::Debug> fmt::Debug for RemoteRecorder<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRecorder")
            .field("subject", &self.subject)
            .field("state", &self.state)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .finish()
    }
}
