use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::clusterer::{AlgorithmParameters, ClusterResult, Dataset};
use crate::coordinator::history::HistoryEntry;
use crate::executor::JobId;

/// The single in-flight request
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub params: AlgorithmParameters,
    pub dataset: Arc<Dataset>,
    /// Fingerprint of `dataset` at submission
    pub dataset_ref: String,
    pub submitted_at: DateTime<Utc>,
}

/// Coordinator lifecycle; at most one job is ever past `Idle`
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Submitting { job_id: JobId },
    Running(Job),
}

impl JobState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, JobState::Idle)
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobState::Idle => None,
            JobState::Submitting { job_id } => Some(job_id),
            JobState::Running(job) => Some(&job.id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Submitting { .. } => "submitting",
            JobState::Running(_) => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Running,
    Success,
    Error,
    Cancelled,
}

/// What the caller shows next to the current result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub kind: StatusKind,
    pub message: String,
}

impl Status {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new(StatusKind::Idle, "Ready")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Dataset, parameters, and result the caller currently sees.
///
/// Replaced as a whole on undo/redo so no half-restored state is observable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workspace {
    pub dataset: Option<Arc<Dataset>>,
    pub params: AlgorithmParameters,
    pub result: Option<Arc<ClusterResult>>,
}

impl From<&HistoryEntry> for Workspace {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            dataset: Some(Arc::clone(&entry.data)),
            params: entry.parameters.clone(),
            result: Some(Arc::clone(&entry.result)),
        }
    }
}
