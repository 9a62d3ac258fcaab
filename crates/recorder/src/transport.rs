//! Transport seam between the recorders and the master

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method used for a record write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Create a record in the active state
    Post,

    /// Move a record to a terminal state
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single record write addressed to the master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRequest {
    pub method: Method,

    /// Resource path, e.g. `/api/v1/checkpoints`
    pub endpoint: String,

    /// JSON body, wrapped in the record's envelope key
    pub body: Value,
}

/// Outcome of a record write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterResponse {
    /// The master accepted the write
    Acknowledged { status: u16 },

    /// The master refused the write or could not be reached; `raw` is
    /// whatever the transport received or the failure it hit
    Rejected { raw: String },
}

impl MasterResponse {
    pub fn ok() -> Self {
        MasterResponse::Acknowledged { status: 200 }
    }

    pub fn rejected(raw: impl Into<String>) -> Self {
        MasterResponse::Rejected { raw: raw.into() }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, MasterResponse::Acknowledged { .. })
    }
}

/// Blocking transport to the master.
///
/// Implementations own connection handling, signing and timeouts. They
/// never retry on behalf of the recorders: every failure is reported as
/// `Rejected` and surfaced to the caller immediately.
pub trait MasterTransport: Send + Sync {
    fn send(&self, request: &MasterRequest) -> MasterResponse;
}

/// Thread-safe handle to a transport
pub type TransportHandle = Arc<dyn MasterTransport>;
