// the coordinator <-> executor contract
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::clusterer::{Algorithm, ClusterError, ClusterResult, ErrorKind, Point, Progress};

/// Opaque job identifier; fresh ids are UUID v4 strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Cluster {
        job_id: JobId,
        algorithm: String,
        data: Vec<Point>,
        #[serde(default)]
        options: Value,
    },
    #[serde(rename_all = "camelCase")]
    Cancel { job_id: JobId },
}

impl Request {
    pub fn job_id(&self) -> &JobId {
        match self {
            Request::Cluster { job_id, .. } | Request::Cancel { job_id } => job_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub kind: ErrorKind,
}

impl From<&ClusterError> for ErrorPayload {
    fn from(err: &ClusterError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Progress {
        job_id: JobId,
        algorithm: Algorithm,
        #[serde(flatten)]
        progress: Progress,
        phase: String,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        job_id: JobId,
        algorithm: Algorithm,
        result: ClusterResult,
    },
    /// `algorithm` echoes the request, which may name no known algorithm
    #[serde(rename_all = "camelCase")]
    Error {
        job_id: JobId,
        algorithm: String,
        error: ErrorPayload,
    },
    #[serde(rename_all = "camelCase")]
    Cancelled { job_id: JobId },
}

impl Event {
    pub fn job_id(&self) -> &JobId {
        match self {
            Event::Progress { job_id, .. }
            | Event::Complete { job_id, .. }
            | Event::Error { job_id, .. }
            | Event::Cancelled { job_id } => job_id,
        }
    }

    /// Whether this is the last message for its job
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Progress { .. })
    }
}

/// Parse one JSON request, or build the error event that rejects it
pub fn decode_request(line: &str) -> Result<Request, Event> {
    serde_json::from_str(line).map_err(|e| {
        let raw: Option<Value> = serde_json::from_str(line).ok();
        let field = |name: &str| {
            raw.as_ref()
                .and_then(|v| v.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Event::Error {
            job_id: JobId(field("jobId")),
            algorithm: field("algorithm"),
            error: ErrorPayload {
                message: format!("Malformed request: {}", e),
                kind: ErrorKind::Input,
            },
        }
    })
}
