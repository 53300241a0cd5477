//! Runs clustering jobs away from the caller's thread.
//!
//! The executor owns a dedicated OS thread. Requests go in and events come
//! out over channels, so the caller never shares memory with a running
//! algorithm and never waits on one. One job runs at a time; requests that
//! arrive mid-run are queued and a cancel is noticed at the next algorithm
//! checkpoint.

mod protocol;
mod worker;


pub use protocol::{ErrorPayload, Event, JobId, Request, decode_request};

use serde::{Deserialize, Serialize};
use std::thread;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::clusterer::{AlgorithmParameters, Point};
use worker::Worker;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Executor is not running")]
    Disconnected,

    #[error("Failed to start executor thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Progress cadence per algorithm, in algorithm steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecutorConfig {
    pub kmeans_progress_every: usize,
    pub dbscan_progress_every: usize,
    pub hierarchical_progress_every: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kmeans_progress_every: 5,
            dbscan_progress_every: 100,
            hierarchical_progress_every: 10,
        }
    }
}

/// Sending half of the executor; cheap to clone
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl ExecutorHandle {
    pub fn send(&self, request: Request) -> Result<(), ExecutorError> {
        self.requests
            .send(request)
            .map_err(|_| ExecutorError::Disconnected)
    }

    /// Submit a job; the points are copied into the request
    pub fn submit(
        &self,
        job_id: JobId,
        params: &AlgorithmParameters,
        data: &[Point],
    ) -> Result<(), ExecutorError> {
        self.send(Request::Cluster {
            job_id,
            algorithm: params.algorithm().to_string(),
            data: data.to_vec(),
            options: params.options(),
        })
    }

    pub fn cancel(&self, job_id: JobId) -> Result<(), ExecutorError> {
        self.send(Request::Cancel { job_id })
    }
}

pub struct Executor;

impl Executor {
    /// Start the worker thread. It exits once every handle is dropped.
    pub fn spawn(
        config: ExecutorConfig,
    ) -> Result<(ExecutorHandle, mpsc::UnboundedReceiver<Event>), ExecutorError> {
        let (handle, requests) = Self::channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name("cluster-executor".to_string())
            .spawn(move || Worker::new(requests, events_tx, config).run())?;
        debug!("executor thread started");

        Ok((handle, events))
    }

    /// Serve requests on the current thread until every handle is dropped
    pub fn run_blocking(
        requests: mpsc::UnboundedReceiver<Request>,
        events: mpsc::UnboundedSender<Event>,
        config: ExecutorConfig,
    ) {
        Worker::new(requests, events, config).run();
    }

    /// A handle plus the request stream it feeds, for [`Executor::run_blocking`]
    pub fn channel() -> (ExecutorHandle, mpsc::UnboundedReceiver<Request>) {
        let (requests, rx) = mpsc::unbounded_channel();
        (ExecutorHandle { requests }, rx)
    }
}
