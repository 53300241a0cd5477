//! Job lifecycle on the caller's side of the executor boundary.
//!
//! The [`Coordinator`] owns the current dataset, parameters, and result, and
//! runs at most one job at a time:
//!
//! ```text
//! Idle ──submit──▶ Submitting ──sent──▶ Running ──complete/error/cancel──▶ Idle
//! ```
//!
//! Events from the executor are matched by job id; anything for a job that is
//! no longer current is dropped. Parameter edits made while a result is on
//! screen re-run the job after a quiet period instead of immediately.

mod debounce;
mod history;
mod state;

#[cfg(test)]
mod tests;

pub use debounce::Debouncer;
pub use history::{History, HistoryEntry};
pub use state::{Job, JobState, Status, StatusKind, Workspace};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clusterer::{AlgorithmParameters, ClusterResult, Dataset, Progress};
use crate::executor::{
    ErrorPayload, Event, Executor, ExecutorConfig, ExecutorError, ExecutorHandle, JobId,
};
use crate::quality::{QualityAssessor, QualityMetrics, SilhouetteAssessor};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    #[error("Busy: job {job_id} is still running")]
    Busy { job_id: JobId },

    #[error("No dataset loaded")]
    NoDataset,

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Executor is not running")]
    ExecutorUnavailable,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Quiet period before a parameter edit re-runs the job
    pub debounce_ms: u64,
    pub history_capacity: usize,
    pub assess_quality: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            history_capacity: 50,
            assess_quality: true,
        }
    }
}

/// What the coordinator tells its caller
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// A debounced re-run was sent to the executor
    Submitted { job_id: JobId },
    Progress { job_id: JobId, progress: Progress },
    Completed {
        job_id: JobId,
        result: Arc<ClusterResult>,
        quality: Option<QualityMetrics>,
    },
    Failed { job_id: JobId, error: ErrorPayload },
    Cancelled { job_id: JobId },
}

impl CoordinatorEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorEvent::Completed { .. }
                | CoordinatorEvent::Failed { .. }
                | CoordinatorEvent::Cancelled { .. }
        )
    }
}

enum Wake {
    Event(Option<Event>),
    Debounce,
}

pub struct Coordinator {
    executor: ExecutorHandle,
    events: mpsc::UnboundedReceiver<Event>,
    state: JobState,
    workspace: Workspace,
    history: History,
    debounce: Debouncer,
    status: Status,
    assessor: Option<Box<dyn QualityAssessor>>,
}

impl Coordinator {
    pub fn new(
        executor: ExecutorHandle,
        events: mpsc::UnboundedReceiver<Event>,
        config: CoordinatorConfig,
    ) -> Self {
        let assessor: Option<Box<dyn QualityAssessor>> = if config.assess_quality {
            Some(Box::new(SilhouetteAssessor::default()))
        } else {
            None
        };
        Self {
            executor,
            events,
            state: JobState::Idle,
            workspace: Workspace::default(),
            history: History::new(config.history_capacity),
            debounce: Debouncer::new(Duration::from_millis(config.debounce_ms)),
            status: Status::default(),
            assessor,
        }
    }

    /// Coordinator wired to a fresh executor thread
    pub fn spawn(
        config: CoordinatorConfig,
        executor: ExecutorConfig,
    ) -> std::result::Result<Self, ExecutorError> {
        let (handle, events) = Executor::spawn(executor)?;
        Ok(Self::new(handle, events, config))
    }

    /// Replace the quality hook; applies even when the config disabled it
    pub fn with_quality_assessor(mut self, assessor: Box<dyn QualityAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn without_quality_assessment(mut self) -> Self {
        self.assessor = None;
        self
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Load a new dataset; the previous result no longer applies to it
    pub fn load_dataset(&mut self, dataset: Dataset) -> Result<()> {
        self.ensure_idle()?;
        info!(points = dataset.len(), "dataset loaded");
        self.workspace = Workspace {
            dataset: Some(Arc::new(dataset)),
            params: self.workspace.params.clone(),
            result: None,
        };
        self.debounce.clear();
        Ok(())
    }

    /// Replace the parameters; re-runs after the debounce window if a result exists
    pub fn set_parameters(&mut self, params: AlgorithmParameters) {
        self.workspace.params = params;
        if self.workspace.result.is_some() {
            self.debounce.schedule(Instant::now());
            debug!(window = ?self.debounce.window(), "re-run scheduled");
        }
    }

    // ========================================================================
    // Job lifecycle
    // ========================================================================

    /// Send the current dataset and parameters to the executor
    pub fn submit(&mut self) -> Result<JobId> {
        self.ensure_idle()?;
        let dataset = self
            .workspace
            .dataset
            .as_ref()
            .map(Arc::clone)
            .ok_or(CoordinatorError::NoDataset)?;
        self.debounce.clear();

        let job_id = JobId::new();
        let params = self.workspace.params.clone();
        self.state = JobState::Submitting {
            job_id: job_id.clone(),
        };

        if let Err(err) = self.executor.submit(job_id.clone(), &params, dataset.points()) {
            warn!(%job_id, error = %err, "submission failed");
            self.state = JobState::Idle;
            self.status = Status::new(StatusKind::Error, err.to_string());
            return Err(CoordinatorError::ExecutorUnavailable);
        }

        info!(%job_id, algorithm = %params.algorithm(), points = dataset.len(), "job submitted");
        self.status = Status::new(
            StatusKind::Running,
            format!("Running {} on {} points", params.algorithm(), dataset.len()),
        );
        self.state = JobState::Running(Job {
            id: job_id.clone(),
            dataset_ref: dataset.fingerprint(),
            params,
            dataset,
            submitted_at: Utc::now(),
        });
        Ok(job_id)
    }

    /// Abandon the running job; its late messages are ignored
    pub fn cancel(&mut self) -> Option<JobId> {
        if !matches!(self.state, JobState::Running(_)) {
            return None;
        }
        let JobState::Running(job) = std::mem::take(&mut self.state) else {
            return None;
        };
        if let Err(err) = self.executor.cancel(job.id.clone()) {
            warn!(job_id = %job.id, error = %err, "cancel not delivered");
        }
        info!(job_id = %job.id, "job cancelled");
        self.status = Status::new(StatusKind::Cancelled, "Cancelled");
        Some(job.id)
    }

    /// Apply one executor event; events for any other job are dropped
    pub fn handle_event(&mut self, event: Event) -> Option<CoordinatorEvent> {
        let is_current = matches!(&self.state, JobState::Running(job) if job.id == *event.job_id());
        if !is_current {
            debug!(job_id = %event.job_id(), "dropping event for superseded job");
            return None;
        }

        match event {
            Event::Progress {
                job_id, progress, ..
            } => Some(CoordinatorEvent::Progress { job_id, progress }),
            Event::Complete { result, .. } => {
                let JobState::Running(job) = std::mem::take(&mut self.state) else {
                    return None;
                };
                Some(self.complete(job, result))
            }
            Event::Error { job_id, error, .. } => {
                self.state = JobState::Idle;
                warn!(%job_id, kind = ?error.kind, message = %error.message, "job failed");
                // The previous result stays on screen
                self.status = Status::new(StatusKind::Error, error.message.clone());
                Some(CoordinatorEvent::Failed { job_id, error })
            }
            Event::Cancelled { job_id } => {
                self.state = JobState::Idle;
                self.status = Status::new(StatusKind::Cancelled, "Cancelled");
                Some(CoordinatorEvent::Cancelled { job_id })
            }
        }
    }

    fn complete(&mut self, job: Job, result: ClusterResult) -> CoordinatorEvent {
        let result = Arc::new(result);
        let quality = self.assess(&job, &result);

        info!(
            job_id = %job.id,
            clusters = result.clusters.len(),
            noise = result.noise.len(),
            ms = result.execution_time_ms,
            "job complete"
        );
        self.status = Status::new(
            StatusKind::Success,
            format!(
                "{} found {} clusters in {:.1} ms",
                result.algorithm,
                result.clusters.len(),
                result.execution_time_ms
            ),
        );

        self.history.push(HistoryEntry {
            job_id: job.id.clone(),
            data: Arc::clone(&job.dataset),
            dataset_ref: job.dataset_ref,
            result: Arc::clone(&result),
            algorithm: result.algorithm,
            parameters: job.params,
            quality_metrics: quality.clone(),
            timestamp: Utc::now(),
        });
        // Edits made during the run stay in the workspace
        self.workspace.result = Some(Arc::clone(&result));

        CoordinatorEvent::Completed {
            job_id: job.id,
            result,
            quality,
        }
    }

    fn assess(&self, job: &Job, result: &ClusterResult) -> Option<QualityMetrics> {
        let assessor = self.assessor.as_ref()?;
        let metric = job.params.metric();
        match assessor.evaluate(
            &job.dataset,
            &result.clusters,
            metric,
            job.dataset.ground_truth(),
        ) {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "quality assessment failed");
                None
            }
        }
    }

    /// Wait for the next thing worth reporting.
    ///
    /// Returns `None` once there is nothing left to wait for: no job running
    /// and no re-run scheduled.
    pub async fn next_event(&mut self) -> Option<CoordinatorEvent> {
        loop {
            // A re-run that comes due while busy waits for the job to finish
            let deadline = match self.state {
                JobState::Idle => self.debounce.deadline(),
                _ => None,
            };
            if !self.state.is_busy() && deadline.is_none() {
                return None;
            }

            let wake = tokio::select! {
                event = self.events.recv() => Wake::Event(event),
                _ = debounce_elapsed(deadline) => Wake::Debounce,
            };

            match wake {
                Wake::Event(Some(event)) => {
                    if let Some(out) = self.handle_event(event) {
                        return Some(out);
                    }
                }
                Wake::Event(None) => {
                    warn!("executor channel closed");
                    self.state = JobState::Idle;
                    self.debounce.clear();
                    self.status = Status::new(StatusKind::Error, "Executor stopped");
                    return None;
                }
                Wake::Debounce => match self.submit() {
                    Ok(job_id) => return Some(CoordinatorEvent::Submitted { job_id }),
                    Err(err) => {
                        warn!(error = %err, "debounced re-run not submitted");
                        self.debounce.clear();
                    }
                },
            }
        }
    }

    /// Drive events until the current job ends; returns its terminal event
    pub async fn run_to_completion(&mut self) -> Option<CoordinatorEvent> {
        while let Some(event) = self.next_event().await {
            if event.is_terminal() {
                return Some(event);
            }
            if let CoordinatorEvent::Progress { job_id, progress } = &event {
                debug!(%job_id, ?progress, "progress");
            }
        }
        None
    }

    // ========================================================================
    // History
    // ========================================================================

    pub fn undo(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let entry = self.history.undo().ok_or(CoordinatorError::NothingToUndo)?;
        self.workspace = Workspace::from(entry);
        self.debounce.clear();
        self.status = Status::new(StatusKind::Idle, "Undone");
        Ok(())
    }

    pub fn redo(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let entry = self.history.redo().ok_or(CoordinatorError::NothingToRedo)?;
        self.workspace = Workspace::from(entry);
        self.debounce.clear();
        self.status = Status::new(StatusKind::Idle, "Redone");
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.state.is_busy() && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.is_busy() && self.history.can_redo()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn rerun_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state.job_id() {
            Some(job_id) => Err(CoordinatorError::Busy {
                job_id: job_id.clone(),
            }),
            None => Ok(()),
        }
    }
}

async fn debounce_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
