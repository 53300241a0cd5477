// worker.rs - the isolated side of the executor boundary
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clusterer::{
    self, Algorithm, AlgorithmParameters, ClusterError, Point, Progress, RunControl,
};
use crate::executor::protocol::{ErrorPayload, Event, JobId, Request};
use crate::executor::ExecutorConfig;

/// Owns one algorithm run at a time; talks to the outside only through channels
pub(crate) struct Worker {
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<Event>,
    /// Cluster requests that arrived while another job was running
    pending: VecDeque<Request>,
    config: ExecutorConfig,
}

impl Worker {
    pub fn new(
        requests: mpsc::UnboundedReceiver<Request>,
        events: mpsc::UnboundedSender<Event>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            requests,
            events,
            pending: VecDeque::new(),
            config,
        }
    }

    /// Serve requests until every sender is gone
    pub fn run(mut self) {
        while let Some(request) = self
            .pending
            .pop_front()
            .or_else(|| self.requests.blocking_recv())
        {
            match request {
                Request::Cluster {
                    job_id,
                    algorithm,
                    data,
                    options,
                } => self.run_job(job_id, algorithm, data, options),
                Request::Cancel { job_id } => {
                    debug!(%job_id, "cancel for a job that is not running");
                }
            }
        }
        debug!("request channel closed, executor stopping");
    }

    fn run_job(&mut self, job_id: JobId, algorithm: String, data: Vec<Point>, options: Value) {
        let mut ctl = JobControl {
            job_id: &job_id,
            algorithm: None,
            requests: &mut self.requests,
            pending: &mut self.pending,
            events: &self.events,
            config: &self.config,
            cancelled: false,
        };

        // A cancel may already be queued behind this request
        if ctl.is_cancelled() {
            ctl.send(Event::Cancelled {
                job_id: job_id.clone(),
            });
            return;
        }

        let params = match AlgorithmParameters::parse(&algorithm, &options) {
            Ok(params) => params,
            Err(err) => {
                warn!(%job_id, %algorithm, error = %err, "rejected cluster request");
                ctl.send(Event::Error {
                    job_id: job_id.clone(),
                    algorithm,
                    error: ErrorPayload::from(&err),
                });
                return;
            }
        };
        let kind = params.algorithm();
        ctl.algorithm = Some(kind);
        info!(%job_id, algorithm = %kind, points = data.len(), "job started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            clusterer::run(&data, &params, &mut ctl)
        }))
        .unwrap_or_else(|payload| Err(ClusterError::Panicked(panic_message(&*payload))));

        // Last chance to honour a cancel that raced the final step
        let cancelled = ctl.is_cancelled();
        let event = match outcome {
            _ if cancelled => Event::Cancelled {
                job_id: job_id.clone(),
            },
            Err(ClusterError::Cancelled) => Event::Cancelled {
                job_id: job_id.clone(),
            },
            Ok(result) => {
                info!(
                    %job_id,
                    clusters = result.clusters.len(),
                    ms = result.execution_time_ms,
                    "job complete"
                );
                Event::Complete {
                    job_id: job_id.clone(),
                    algorithm: kind,
                    result,
                }
            }
            Err(err) => {
                warn!(%job_id, error = %err, "job failed");
                Event::Error {
                    job_id: job_id.clone(),
                    algorithm,
                    error: ErrorPayload::from(&err),
                }
            }
        };
        if matches!(event, Event::Cancelled { .. }) {
            info!(%job_id, "job cancelled");
        }
        ctl.send(event);
    }
}

/// Progress sink and cancellation poll for the running job
struct JobControl<'a> {
    job_id: &'a JobId,
    algorithm: Option<Algorithm>,
    requests: &'a mut mpsc::UnboundedReceiver<Request>,
    pending: &'a mut VecDeque<Request>,
    events: &'a mpsc::UnboundedSender<Event>,
    config: &'a ExecutorConfig,
    cancelled: bool,
}

impl JobControl<'_> {
    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!(job_id = %self.job_id, "event receiver dropped");
        }
    }

    /// Drain requests that arrived since the last poll
    fn drain(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::Cancel { job_id } if job_id == *self.job_id => {
                    self.cancelled = true;
                }
                Request::Cancel { job_id } => {
                    let queued = self.pending.iter().position(
                        |r| matches!(r, Request::Cluster { job_id: id, .. } if *id == job_id),
                    );
                    match queued {
                        Some(pos) => {
                            self.pending.remove(pos);
                            self.send(Event::Cancelled { job_id });
                        }
                        None => debug!(%job_id, "cancel for unknown job"),
                    }
                }
                cluster @ Request::Cluster { .. } => self.pending.push_back(cluster),
            }
        }
    }
}

impl RunControl for JobControl<'_> {
    fn report(&mut self, progress: Progress) {
        if self.is_cancelled() {
            return;
        }
        if let Some(algorithm) = self.algorithm {
            self.send(Event::Progress {
                job_id: self.job_id.clone(),
                algorithm,
                phase: progress.phase().to_string(),
                progress,
            });
        }
    }

    fn is_cancelled(&mut self) -> bool {
        if !self.cancelled {
            self.drain();
        }
        self.cancelled
    }

    fn report_every(&self) -> usize {
        match self.algorithm {
            Some(Algorithm::Kmeans) => self.config.kmeans_progress_every,
            Some(Algorithm::Dbscan) => self.config.dbscan_progress_every,
            Some(Algorithm::Hierarchical) => self.config.hierarchical_progress_every,
            None => 1,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
