//! In-process master for test mode
//!
//! Stores records in memory, enforces the forward-only record lifecycle the
//! real master enforces, and keeps a log of every request. Failures can be
//! injected per method and endpoint.

use dashmap::DashMap;
use parking_lot::Mutex;
use runtime_core::RecordState;
use serde_json::{Map, Value};
use tracing::debug;

use crate::transport::{MasterRequest, MasterResponse, MasterTransport, Method};

/// Body fields that identify a record within its endpoint
const IDENTITY_FIELDS: &[&str] = &[
    "experiment_id",
    "trial_id",
    "step_id",
    "start_batch",
    "end_batch",
    "batch_number",
    "total_batches",
];

/// Latest known version of a record
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub endpoint: String,
    pub state: RecordState,

    /// The record as last written, without its envelope
    pub body: Value,
}

#[derive(Debug)]
struct Fault {
    method: Method,
    endpoint: String,
    raw: String,
    persistent: bool,
}

/// Master that lives in the worker's memory
#[derive(Debug, Default)]
pub struct InMemoryMaster {
    requests: Mutex<Vec<MasterRequest>>,
    records: DashMap<(String, String), StoredRecord>,
    faults: Mutex<Vec<Fault>>,
}

impl InMemoryMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next request matching `method` and `endpoint`
    pub fn reject_next(&self, method: Method, endpoint: &str, raw: impl Into<String>) {
        self.push_fault(method, endpoint, raw.into(), false);
    }

    /// Reject every request matching `method` and `endpoint`
    pub fn reject_always(&self, method: Method, endpoint: &str, raw: impl Into<String>) {
        self.push_fault(method, endpoint, raw.into(), true);
    }

    /// Drop all injected faults
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Every request received, in order, including rejected ones
    pub fn requests(&self) -> Vec<MasterRequest> {
        self.requests.lock().clone()
    }

    /// Requests received for one method and endpoint
    pub fn requests_with(&self, method: Method, endpoint: &str) -> Vec<MasterRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    /// Records stored under an endpoint
    pub fn records(&self, endpoint: &str) -> Vec<StoredRecord> {
        self.records
            .iter()
            .filter(|entry| entry.key().0 == endpoint)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Records under an endpoint that are still active
    pub fn active_records(&self, endpoint: &str) -> Vec<StoredRecord> {
        self.records(endpoint)
            .into_iter()
            .filter(|record| record.state == RecordState::Active)
            .collect()
    }

    fn push_fault(&self, method: Method, endpoint: &str, raw: String, persistent: bool) {
        self.faults.lock().push(Fault {
            method,
            endpoint: endpoint.to_string(),
            raw,
            persistent,
        });
    }

    fn take_fault(&self, request: &MasterRequest) -> Option<String> {
        let mut faults = self.faults.lock();
        let index = faults
            .iter()
            .position(|f| f.method == request.method && f.endpoint == request.endpoint)?;
        if faults[index].persistent {
            Some(faults[index].raw.clone())
        } else {
            Some(faults.remove(index).raw)
        }
    }

    fn apply(&self, request: &MasterRequest) -> Result<(), String> {
        let record = unwrap_envelope(&request.body)?;
        let state: RecordState = record
            .get("state")
            .cloned()
            .ok_or_else(|| "400 Bad Request: record has no state".to_string())
            .and_then(|s| {
                serde_json::from_value(s).map_err(|e| format!("400 Bad Request: {}", e))
            })?;

        let key = (request.endpoint.clone(), identity(record));
        let stored = StoredRecord {
            endpoint: request.endpoint.clone(),
            state,
            body: Value::Object(record.clone()),
        };

        match request.method {
            Method::Post => {
                if state != RecordState::Active {
                    return Err(format!("400 Bad Request: cannot create record in {}", state));
                }
                if self.records.contains_key(&key) {
                    return Err(format!("409 Conflict: record {} already exists", key.1));
                }
                self.records.insert(key, stored);
            }
            Method::Put => {
                let mut existing = self
                    .records
                    .get_mut(&key)
                    .ok_or_else(|| format!("404 Not Found: record {}", key.1))?;
                if existing.state.is_terminal() {
                    return Err(format!(
                        "409 Conflict: record {} is already {}",
                        key.1, existing.state
                    ));
                }
                if !state.is_terminal() {
                    return Err("400 Bad Request: updates must be terminal".to_string());
                }
                *existing = stored;
            }
        }
        Ok(())
    }
}

impl MasterTransport for InMemoryMaster {
    fn send(&self, request: &MasterRequest) -> MasterResponse {
        self.requests.lock().push(request.clone());

        if let Some(raw) = self.take_fault(request) {
            debug!(method = %request.method, endpoint = %request.endpoint, "Injected fault");
            return MasterResponse::rejected(raw);
        }

        match self.apply(request) {
            Ok(()) => {
                debug!(method = %request.method, endpoint = %request.endpoint, "Record stored");
                MasterResponse::ok()
            }
            Err(raw) => MasterResponse::rejected(raw),
        }
    }
}

fn unwrap_envelope(body: &Value) -> Result<&Map<String, Value>, String> {
    body.as_object()
        .filter(|envelope| envelope.len() == 1)
        .and_then(|envelope| envelope.values().next())
        .and_then(Value::as_object)
        .ok_or_else(|| "400 Bad Request: expected a single enveloped record".to_string())
}

fn identity(record: &Map<String, Value>) -> String {
    IDENTITY_FIELDS
        .iter()
        .filter_map(|field| record.get(*field).map(|v| format!("{}={}", field, v)))
        .collect::<Vec<_>>()
        .join(",")
}
