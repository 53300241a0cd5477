use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification carried on the wire next to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Rejected before any work was done
    Input,
    /// Failed while the algorithm was running
    Execution,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Dataset is empty")]
    EmptyInput,

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Malformed options: {0}")]
    InvalidOptions(String),

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: &'static str,
    },

    #[error("Cannot build {requested} clusters from {n_items} points")]
    InvalidClusterCount { requested: usize, n_items: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Non-finite value produced during {stage}")]
    NonFinite { stage: &'static str },

    #[error("Algorithm panicked: {0}")]
    Panicked(String),

    #[error("Job was cancelled")]
    Cancelled,
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::EmptyInput
            | ClusterError::UnknownAlgorithm(_)
            | ClusterError::InvalidOptions(_)
            | ClusterError::InvalidParameter { .. }
            | ClusterError::InvalidClusterCount { .. }
            | ClusterError::DimensionMismatch { .. } => ErrorKind::Input,
            ClusterError::NonFinite { .. }
            | ClusterError::Panicked(_)
            | ClusterError::Cancelled => ErrorKind::Execution,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
