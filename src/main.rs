use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cluster_playground::executor::decode_request;
use cluster_playground::{
    AlgorithmParameters, Coordinator, CoordinatorEvent, Dataset, Event, Executor, PlaygroundConfig,
    Point,
};
use serde::Deserialize;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tokio::sync::mpsc;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

/// Clustering playground compute engine
#[derive(Parser, Debug)]
#[command(name = "playground")]
#[command(about = "Run K-Means, DBSCAN, and hierarchical clustering jobs")]
struct Args {
    /// JSON config file; defaults apply when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cluster one dataset and print the result as JSON
    Cluster {
        /// Points as `[[x, y], ...]` or `{ "points": [...], "labels": [...] }`
        #[arg(long)]
        input: PathBuf,

        /// kmeans, dbscan, or hierarchical
        #[arg(long, default_value = "kmeans")]
        algorithm: String,

        /// Algorithm options as a JSON object, e.g. '{"k": 3, "seed": 42}'
        #[arg(long, default_value = "{}")]
        options: String,
    },
    /// Serve the executor protocol: JSON requests on stdin, JSON events on stdout
    Worker,
}

/// Accepted shapes of the `--input` file
#[derive(Deserialize)]
#[serde(untagged)]
enum InputFile {
    Labeled {
        points: Vec<Point>,
        #[serde(default)]
        labels: Option<Vec<String>>,
    },
    Points(Vec<Point>),
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging; stdout is reserved for results and protocol messages
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => PlaygroundConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlaygroundConfig::default(),
    };

    match args.command {
        Command::Cluster {
            input,
            algorithm,
            options,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(run_cluster(config, &input, &algorithm, &options))
        }
        Command::Worker => run_worker(config),
    }
}

async fn run_cluster(
    config: PlaygroundConfig,
    input: &Path,
    algorithm: &str,
    options: &str,
) -> Result<()> {
    let dataset = read_dataset(input)?;
    let options: serde_json::Value =
        serde_json::from_str(options).context("--options is not valid JSON")?;
    let params = AlgorithmParameters::parse(algorithm, &options)
        .with_context(|| format!("Invalid parameters for {}", algorithm))?;

    info!(points = dataset.len(), algorithm = %params.algorithm(), "clustering");
    let mut coordinator = Coordinator::spawn(config.coordinator, config.executor)
        .context("Failed to start executor")?;
    coordinator.load_dataset(dataset)?;
    coordinator.set_parameters(params);
    coordinator.submit()?;

    while let Some(event) = coordinator.next_event().await {
        match event {
            CoordinatorEvent::Progress { progress, .. } => {
                info!(phase = progress.phase(), ?progress, "progress");
            }
            CoordinatorEvent::Completed {
                job_id,
                result,
                quality,
            } => {
                let output = json!({
                    "jobId": job_id,
                    "result": result,
                    "quality": quality,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
                return Ok(());
            }
            CoordinatorEvent::Failed { error, .. } => {
                bail!("Clustering failed ({:?}): {}", error.kind, error.message)
            }
            CoordinatorEvent::Cancelled { job_id } => bail!("Job {} was cancelled", job_id),
            CoordinatorEvent::Submitted { job_id } => debug!(%job_id, "submitted"),
        }
    }
    bail!("Executor stopped before the job finished")
}

fn read_dataset(path: &Path) -> Result<Dataset> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let input: InputFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse points in {}", path.display()))?;

    Ok(match input {
        InputFile::Labeled { points, labels } => {
            let dataset = Dataset::new(points);
            match labels {
                Some(labels) => dataset.with_labels(labels),
                None => dataset,
            }
        }
        InputFile::Points(points) => Dataset::new(points),
    })
}

/// One JSON request per stdin line in, one JSON event per stdout line out
fn run_worker(config: PlaygroundConfig) -> Result<()> {
    let (handle, requests) = Executor::channel();
    let (events_tx, mut events) = mpsc::unbounded_channel::<Event>();

    let executor_events = events_tx.clone();
    thread::Builder::new()
        .name("cluster-executor".to_string())
        .spawn(move || Executor::run_blocking(requests, executor_events, config.executor))
        .context("Failed to start executor thread")?;

    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let sent = match decode_request(&line) {
                    Ok(request) => handle.send(request).is_ok(),
                    Err(rejection) => events_tx.send(rejection).is_ok(),
                };
                if !sent {
                    break;
                }
            }
            debug!("stdin closed");
        })
        .context("Failed to start stdin reader")?;

    let stdout = io::stdout();
    while let Some(event) = events.blocking_recv() {
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &event)?;
        writeln!(out)?;
        out.flush()?;
    }
    Ok(())
}
