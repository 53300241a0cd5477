use super::*;
use crate::clusterer::{
    Algorithm, Cluster, DbscanParams, ErrorKind, HierarchicalParams, KMeansParams, Linkage, Metric,
    Point, Unobserved, run,
};
use crate::executor::Request;
use anyhow::bail;

fn blobs() -> Dataset {
    Dataset::new(
        [
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
        ]
        .into_iter()
        .map(Point::from)
        .collect(),
    )
}

/// Coordinator wired to channels the test drives by hand
fn setup(
    config: CoordinatorConfig,
) -> (
    Coordinator,
    mpsc::UnboundedReceiver<Request>,
    mpsc::UnboundedSender<Event>,
) {
    let (handle, requests) = Executor::channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    (Coordinator::new(handle, events, config), requests, events_tx)
}

/// Run a request the way the executor would and return its terminal event
fn execute(request: Request) -> Event {
    let Request::Cluster {
        job_id,
        algorithm,
        data,
        options,
    } = request
    else {
        panic!("expected a cluster request, got {:?}", request);
    };
    let params = AlgorithmParameters::parse(&algorithm, &options).unwrap();
    let result = run(&data, &params, &mut Unobserved).unwrap();
    Event::Complete {
        job_id,
        algorithm: params.algorithm(),
        result,
    }
}

fn finish(
    coordinator: &mut Coordinator,
    requests: &mut mpsc::UnboundedReceiver<Request>,
) -> Option<CoordinatorEvent> {
    let request = requests.try_recv().unwrap();
    coordinator.handle_event(execute(request))
}

fn kmeans(k: usize) -> AlgorithmParameters {
    KMeansParams::new(k).with_seed(7).into()
}

fn entry(tag: &str) -> HistoryEntry {
    let data = Arc::new(blobs());
    HistoryEntry {
        job_id: JobId::from(tag),
        dataset_ref: data.fingerprint(),
        data,
        result: Arc::new(ClusterResult {
            algorithm: Algorithm::Kmeans,
            clusters: Vec::new(),
            noise: Vec::new(),
            iterations: None,
            converged: None,
            dendrogram: None,
            execution_time_ms: 0.0,
        }),
        algorithm: Algorithm::Kmeans,
        parameters: kmeans(2),
        quality_metrics: None,
        timestamp: Utc::now(),
    }
}

fn tags(history: &History) -> Vec<&str> {
    history.entries().map(|e| e.job_id.as_str()).collect()
}

struct FailingAssessor;

impl QualityAssessor for FailingAssessor {
    fn evaluate(
        &self,
        _data: &Dataset,
        _clusters: &[Cluster],
        _metric: Metric,
        _ground_truth: Option<&[String]>,
    ) -> anyhow::Result<QualityMetrics> {
        bail!("assessor offline")
    }
}

// ========================================================================
// Submission Tests
// ========================================================================

#[test]
fn test_submit_requires_dataset() {
    let (mut coordinator, _requests, _events) = setup(CoordinatorConfig::default());
    assert_eq!(coordinator.submit(), Err(CoordinatorError::NoDataset));
    assert_eq!(coordinator.state(), &JobState::Idle);
}

#[test]
fn test_submit_sends_snapshot_of_inputs() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));

    let job_id = coordinator.submit().unwrap();
    match requests.try_recv().unwrap() {
        Request::Cluster {
            job_id: sent,
            algorithm,
            data,
            options,
        } => {
            assert_eq!(sent, job_id);
            assert_eq!(algorithm, "kmeans");
            assert_eq!(data, blobs().points());
            assert_eq!(options, kmeans(2).options());
        }
        other => panic!("expected a cluster request, got {:?}", other),
    }

    match coordinator.state() {
        JobState::Running(job) => {
            assert_eq!(job.id, job_id);
            assert_eq!(job.dataset_ref, blobs().fingerprint());
        }
        other => panic!("expected running, got {:?}", other),
    }
    assert_eq!(coordinator.status().kind, StatusKind::Running);
}

#[test]
fn test_single_flight_rejects_while_running() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    let job_id = coordinator.submit().unwrap();

    let busy = CoordinatorError::Busy {
        job_id: job_id.clone(),
    };
    assert_eq!(coordinator.submit(), Err(busy.clone()));
    assert_eq!(coordinator.load_dataset(blobs()), Err(busy.clone()));
    assert_eq!(coordinator.undo(), Err(busy));

    // only the first request reached the executor
    assert!(requests.try_recv().is_ok());
    assert!(requests.try_recv().is_err());
    assert_eq!(coordinator.state().job_id(), Some(&job_id));
}

#[test]
fn test_submit_fails_when_executor_is_gone() {
    let (handle, requests) = Executor::channel();
    let (_events_tx, events) = mpsc::unbounded_channel();
    drop(requests);
    let mut coordinator = Coordinator::new(handle, events, CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();

    assert_eq!(coordinator.submit(), Err(CoordinatorError::ExecutorUnavailable));
    assert_eq!(coordinator.state(), &JobState::Idle);
    assert_eq!(coordinator.status().kind, StatusKind::Error);
}

// ========================================================================
// Event Handling Tests
// ========================================================================

#[test]
fn test_completion_records_history_and_quality() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));
    let job_id = coordinator.submit().unwrap();

    match finish(&mut coordinator, &mut requests) {
        Some(CoordinatorEvent::Completed {
            job_id: done,
            result,
            quality,
        }) => {
            assert_eq!(done, job_id);
            assert_eq!(result.clusters.len(), 2);
            assert!(quality.unwrap().summary.overall_score >= 0.75);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    assert_eq!(coordinator.state(), &JobState::Idle);
    assert_eq!(coordinator.status().kind, StatusKind::Success);
    assert_eq!(coordinator.history().len(), 1);
    let entry = coordinator.history().current().unwrap();
    assert_eq!(entry.job_id, job_id);
    assert_eq!(entry.parameters, kmeans(2));
    assert_eq!(entry.clusters().len(), 2);
    assert!(entry.quality_metrics.is_some());
    assert_eq!(
        coordinator.workspace().result.as_deref(),
        Some(entry.result.as_ref())
    );
}

#[test]
fn test_quality_uses_ground_truth_labels() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    let labels = ["a", "a", "a", "b", "b", "b"].map(String::from).to_vec();
    coordinator
        .load_dataset(blobs().with_labels(labels))
        .unwrap();
    coordinator.set_parameters(kmeans(2));
    coordinator.submit().unwrap();

    match finish(&mut coordinator, &mut requests) {
        Some(CoordinatorEvent::Completed { quality, .. }) => {
            assert_eq!(quality.unwrap().purity, Some(1.0));
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn test_failed_assessment_still_records_result() {
    let (coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    let mut coordinator = coordinator.with_quality_assessor(Box::new(FailingAssessor));
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.submit().unwrap();

    match finish(&mut coordinator, &mut requests) {
        Some(CoordinatorEvent::Completed { quality, .. }) => assert!(quality.is_none()),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(coordinator.history().len(), 1);
    assert!(coordinator.history().current().unwrap().quality_metrics.is_none());
}

#[test]
fn test_quality_is_scored_under_the_job_metric() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    let data = blobs();
    coordinator.load_dataset(data.clone()).unwrap();
    coordinator.set_parameters(
        KMeansParams::new(2)
            .with_seed(7)
            .with_metric(Metric::Manhattan)
            .into(),
    );
    coordinator.submit().unwrap();

    match finish(&mut coordinator, &mut requests) {
        Some(CoordinatorEvent::Completed { result, quality, .. }) => {
            let expected = SilhouetteAssessor::default()
                .evaluate(&data, &result.clusters, Metric::Manhattan, None)
                .unwrap();
            assert_eq!(quality, Some(expected));
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn test_disabled_quality_hook_is_skipped() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig {
        assess_quality: false,
        ..CoordinatorConfig::default()
    });
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.submit().unwrap();

    match finish(&mut coordinator, &mut requests) {
        Some(CoordinatorEvent::Completed { quality, .. }) => assert!(quality.is_none()),
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn test_events_for_other_jobs_are_dropped() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    let job_id = coordinator.submit().unwrap();
    let request = requests.try_recv().unwrap();

    // a late result for a superseded job must not land
    let Event::Complete {
        algorithm, result, ..
    } = execute(request.clone())
    else {
        unreachable!()
    };
    let stale = Event::Complete {
        job_id: JobId::from("superseded"),
        algorithm,
        result,
    };
    assert_eq!(coordinator.handle_event(stale), None);
    assert!(coordinator.state().is_busy());
    assert!(coordinator.history().is_empty());

    let progress = Progress::Iteration {
        iteration: 1,
        max_iterations: 100,
    };
    assert_eq!(
        coordinator.handle_event(Event::Progress {
            job_id: job_id.clone(),
            algorithm: Algorithm::Kmeans,
            progress,
            phase: "iterate".to_string(),
        }),
        Some(CoordinatorEvent::Progress { job_id, progress })
    );
    assert!(coordinator.handle_event(execute(request)).is_some());
    assert_eq!(coordinator.history().len(), 1);
}

#[test]
fn test_error_keeps_previous_result() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));
    coordinator.submit().unwrap();
    finish(&mut coordinator, &mut requests);
    let before = coordinator.workspace().result.clone();

    let job_id = coordinator.submit().unwrap();
    let error = ErrorPayload {
        message: "Non-finite value during centroid update".to_string(),
        kind: ErrorKind::Execution,
    };
    let event = coordinator.handle_event(Event::Error {
        job_id: job_id.clone(),
        algorithm: "kmeans".to_string(),
        error: error.clone(),
    });

    assert_eq!(event, Some(CoordinatorEvent::Failed { job_id, error }));
    assert_eq!(coordinator.state(), &JobState::Idle);
    assert_eq!(coordinator.status().kind, StatusKind::Error);
    assert_eq!(coordinator.workspace().result, before);
    assert_eq!(coordinator.history().len(), 1);
}

#[test]
fn test_cancel_discards_late_result() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    let job_id = coordinator.submit().unwrap();

    assert_eq!(coordinator.cancel(), Some(job_id.clone()));
    assert_eq!(coordinator.state(), &JobState::Idle);
    assert_eq!(coordinator.status().kind, StatusKind::Cancelled);

    let request = requests.try_recv().unwrap();
    assert_eq!(requests.try_recv().unwrap(), Request::Cancel { job_id });
    assert_eq!(coordinator.handle_event(execute(request)), None);
    assert!(coordinator.history().is_empty());
    assert!(coordinator.workspace().result.is_none());

    // nothing left to cancel
    assert_eq!(coordinator.cancel(), None);
}

// ========================================================================
// History Tests
// ========================================================================

#[test]
fn test_undo_redo_restores_second_job() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();

    let runs: Vec<AlgorithmParameters> = vec![
        kmeans(2),
        DbscanParams::new(3.0, 2).into(),
        HierarchicalParams::new(3, Linkage::Single).into(),
    ];
    let mut snapshots = Vec::new();
    for params in runs {
        coordinator.set_parameters(params);
        coordinator.submit().unwrap();
        finish(&mut coordinator, &mut requests).unwrap();
        snapshots.push(coordinator.workspace().clone());
    }

    coordinator.undo().unwrap();
    coordinator.undo().unwrap();
    assert_eq!(coordinator.workspace(), &snapshots[0]);
    coordinator.redo().unwrap();

    assert_eq!(coordinator.workspace(), &snapshots[1]);
    assert_eq!(coordinator.history().cursor(), 1);
    assert!(coordinator.can_undo());
    assert!(coordinator.can_redo());
    // restoring never schedules a re-run
    assert!(!coordinator.rerun_pending());
}

#[test]
fn test_undo_and_redo_at_the_ends() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    assert_eq!(coordinator.undo(), Err(CoordinatorError::NothingToUndo));
    assert_eq!(coordinator.redo(), Err(CoordinatorError::NothingToRedo));

    coordinator.load_dataset(blobs()).unwrap();
    coordinator.submit().unwrap();
    finish(&mut coordinator, &mut requests);
    assert_eq!(coordinator.undo(), Err(CoordinatorError::NothingToUndo));
    assert_eq!(coordinator.redo(), Err(CoordinatorError::NothingToRedo));
}

#[test]
fn test_history_evicts_oldest_past_capacity() {
    let mut history = History::new(3);
    for tag in ["a", "b", "c", "d"] {
        history.push(entry(tag));
    }

    assert_eq!(tags(&history), vec!["b", "c", "d"]);
    assert_eq!(history.cursor(), 2);
    assert_eq!(history.current().unwrap().job_id.as_str(), "d");
}

#[test]
fn test_history_push_after_undo_drops_redo_tail() {
    let mut history = History::new(10);
    for tag in ["a", "b", "c"] {
        history.push(entry(tag));
    }
    history.undo();
    history.undo();
    history.push(entry("d"));

    assert_eq!(tags(&history), vec!["a", "d"]);
    assert!(!history.can_redo());
    assert_eq!(history.undo().unwrap().job_id.as_str(), "a");
}

#[test]
fn test_history_capacity_is_at_least_one() {
    let mut history = History::new(0);
    history.push(entry("a"));
    history.push(entry("b"));
    assert_eq!(history.capacity(), 1);
    assert_eq!(tags(&history), vec!["b"]);
    assert!(!history.can_undo());
}

// ========================================================================
// Debounce Tests
// ========================================================================

#[test]
fn test_debouncer_restarts_window() {
    let start = Instant::now();
    let mut debounce = Debouncer::new(Duration::from_millis(100));
    assert!(!debounce.is_pending());

    debounce.schedule(start);
    debounce.schedule(start + Duration::from_millis(60));
    assert!(!debounce.is_due(start + Duration::from_millis(120)));
    assert!(debounce.is_due(start + Duration::from_millis(160)));

    debounce.clear();
    assert!(!debounce.is_due(start + Duration::from_millis(500)));
}

#[test]
fn test_parameter_edit_reruns_only_with_result() {
    let (mut coordinator, mut requests, _events) = setup(CoordinatorConfig::default());
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));
    assert!(!coordinator.rerun_pending());

    coordinator.submit().unwrap();
    finish(&mut coordinator, &mut requests);
    coordinator.set_parameters(kmeans(3));
    assert!(coordinator.rerun_pending());

    // a manual submit supersedes the scheduled one
    coordinator.submit().unwrap();
    assert!(!coordinator.rerun_pending());
}

// ========================================================================
// End-to-End Tests
// ========================================================================

#[tokio::test]
async fn test_end_to_end_with_executor_thread() {
    let mut coordinator =
        Coordinator::spawn(CoordinatorConfig::default(), ExecutorConfig::default()).unwrap();
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));
    let job_id = coordinator.submit().unwrap();

    match coordinator.run_to_completion().await {
        Some(CoordinatorEvent::Completed {
            job_id: done,
            result,
            ..
        }) => {
            assert_eq!(done, job_id);
            let mut sizes: Vec<usize> = result.clusters.iter().map(|c| c.len()).collect();
            sizes.sort();
            assert_eq!(sizes, vec![3, 3]);
            assert_eq!(result.converged, Some(true));
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(coordinator.history().len(), 1);
    assert!(coordinator.next_event().await.is_none());
}

#[tokio::test]
async fn test_input_error_surfaces_as_status() {
    let mut coordinator =
        Coordinator::spawn(CoordinatorConfig::default(), ExecutorConfig::default()).unwrap();
    coordinator.load_dataset(Dataset::default()).unwrap();
    coordinator.submit().unwrap();

    match coordinator.run_to_completion().await {
        Some(CoordinatorEvent::Failed { error, .. }) => assert_eq!(error.kind, ErrorKind::Input),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(coordinator.status().kind, StatusKind::Error);
    assert!(coordinator.history().is_empty());
}

#[tokio::test]
async fn test_debounced_edits_coalesce_into_one_run() {
    let config = CoordinatorConfig {
        debounce_ms: 20,
        ..CoordinatorConfig::default()
    };
    let mut coordinator = Coordinator::spawn(config, ExecutorConfig::default()).unwrap();
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));
    coordinator.submit().unwrap();
    coordinator.run_to_completion().await.unwrap();

    coordinator.set_parameters(kmeans(3));
    coordinator.set_parameters(kmeans(4));
    assert!(matches!(
        coordinator.next_event().await,
        Some(CoordinatorEvent::Submitted { .. })
    ));
    assert!(matches!(
        coordinator.run_to_completion().await,
        Some(CoordinatorEvent::Completed { .. })
    ));

    assert_eq!(coordinator.history().len(), 2);
    assert_eq!(coordinator.history().current().unwrap().parameters, kmeans(4));
    assert!(coordinator.next_event().await.is_none());
}

#[tokio::test]
async fn test_rerun_waits_for_running_job() {
    let config = CoordinatorConfig {
        debounce_ms: 0,
        ..CoordinatorConfig::default()
    };
    let mut coordinator = Coordinator::spawn(config, ExecutorConfig::default()).unwrap();
    coordinator.load_dataset(blobs()).unwrap();
    coordinator.set_parameters(kmeans(2));
    coordinator.submit().unwrap();
    coordinator.run_to_completion().await.unwrap();

    let running = coordinator.submit().unwrap();
    coordinator.set_parameters(kmeans(3));

    match coordinator.run_to_completion().await {
        Some(CoordinatorEvent::Completed { job_id, .. }) => assert_eq!(job_id, running),
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(matches!(
        coordinator.next_event().await,
        Some(CoordinatorEvent::Submitted { .. })
    ));
    coordinator.run_to_completion().await.unwrap();
    assert_eq!(coordinator.history().len(), 3);
}

#[tokio::test]
async fn test_cancelled_job_leaves_no_trace() {
    let mut coordinator =
        Coordinator::spawn(CoordinatorConfig::default(), ExecutorConfig::default()).unwrap();
    let points: Vec<Point> = (0..300)
        .map(|i| Point::from([(i % 15) as f64, (i / 15) as f64]))
        .collect();
    coordinator.load_dataset(Dataset::new(points)).unwrap();
    coordinator.set_parameters(HierarchicalParams::new(1, Linkage::Average).into());

    let cancelled = coordinator.submit().unwrap();
    assert_eq!(coordinator.cancel(), Some(cancelled));
    assert!(coordinator.next_event().await.is_none());

    coordinator.set_parameters(kmeans(2));
    let job_id = coordinator.submit().unwrap();
    match coordinator.run_to_completion().await {
        Some(CoordinatorEvent::Completed { job_id: done, .. }) => assert_eq!(done, job_id),
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(coordinator.history().len(), 1);
}
