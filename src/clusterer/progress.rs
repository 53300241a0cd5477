use serde::{Deserialize, Serialize};

use crate::clusterer::error::{ClusterError, Result};

/// Progress payload; the field set depends on the algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Progress {
    #[serde(rename_all = "camelCase")]
    Iteration {
        iteration: usize,
        max_iterations: usize,
    },
    #[serde(rename_all = "camelCase")]
    Scan { processed: usize, total: usize },
    #[serde(rename_all = "camelCase")]
    Merge {
        clusters_remaining: usize,
        target_clusters: usize,
        merges: usize,
    },
}

impl Progress {
    pub fn phase(&self) -> &'static str {
        match self {
            Progress::Iteration { .. } => "iterate",
            Progress::Scan { .. } => "scan",
            Progress::Merge { .. } => "merge",
        }
    }
}

/// Hooks an algorithm calls at its iteration, expansion, and merge boundaries
pub trait RunControl {
    /// Emit a progress notification
    fn report(&mut self, progress: Progress);

    /// Poll for a cancellation request
    fn is_cancelled(&mut self) -> bool;

    /// Progress cadence, in algorithm steps
    fn report_every(&self) -> usize {
        1
    }

    /// Bail out with [`ClusterError::Cancelled`] once cancellation was requested
    fn checkpoint(&mut self) -> Result<()> {
        if self.is_cancelled() {
            Err(ClusterError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Control for direct, synchronous calls: no progress, never cancelled
#[derive(Debug, Default, Clone, Copy)]
pub struct Unobserved;

impl RunControl for Unobserved {
    fn report(&mut self, _progress: Progress) {}

    fn is_cancelled(&mut self) -> bool {
        false
    }
}

/// Whether step `n` (1-based) falls on the reporting cadence
pub(crate) fn on_cadence(step: usize, every: usize) -> bool {
    step % every.max(1) == 0
}
