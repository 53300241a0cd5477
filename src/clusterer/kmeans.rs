use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

use crate::clusterer::{
    centroid::{centroid_of, seed_centroids},
    error::{ClusterError, Result},
    params::KMeansParams,
    progress::{Progress, RunControl, on_cadence},
    similarity::Metric,
    types::{Algorithm, Cluster, ClusterResult, Point, validate_points},
};

/// Raw outcome of Lloyd iterations, before it is shaped into a result
#[derive(Debug, Clone)]
pub(crate) struct KMeansFit {
    pub members: Vec<Vec<usize>>,
    pub centroids: Vec<Point>,
    pub iterations: usize,
    pub converged: bool,
    /// Total centroid movement per iteration
    #[cfg_attr(not(test), allow(dead_code))]
    pub displacements: Vec<f64>,
}

pub fn kmeans<C: RunControl + ?Sized>(
    data: &[Point],
    params: &KMeansParams,
    ctl: &mut C,
) -> Result<ClusterResult> {
    let started = Instant::now();
    let fit = fit(data, params, ctl)?;

    let clusters = fit
        .members
        .into_iter()
        .zip(fit.centroids)
        .enumerate()
        .map(|(c, (indices, centroid))| Cluster {
            id: c as u32,
            indices,
            centroid: Some(centroid),
        })
        .collect();

    Ok(ClusterResult {
        algorithm: Algorithm::Kmeans,
        clusters,
        noise: Vec::new(),
        iterations: Some(fit.iterations),
        converged: Some(fit.converged),
        dendrogram: None,
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

pub(crate) fn fit<C: RunControl + ?Sized>(
    data: &[Point],
    params: &KMeansParams,
    ctl: &mut C,
) -> Result<KMeansFit> {
    let dim = validate_points(data)?;
    params.validate()?;

    let k = params.k;
    let metric = params.metric;
    let mut rng = match params.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    ctl.checkpoint()?;

    // 1. Seed centroids from dataset points
    let centroids: Vec<Point> = seed_centroids(data, k, params.init_method, metric, &mut rng)
        .into_iter()
        .map(|i| data[i].clone())
        .collect();

    lloyd(data, dim, params, centroids, ctl)
}

/// Refine the given starting centroids until convergence or the iteration cap
pub(crate) fn lloyd<C: RunControl + ?Sized>(
    data: &[Point],
    dim: usize,
    params: &KMeansParams,
    mut centroids: Vec<Point>,
    ctl: &mut C,
) -> Result<KMeansFit> {
    let k = centroids.len();
    let metric = params.metric;
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut displacements = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 1..=params.max_iterations {
        ctl.checkpoint()?;
        iterations = iteration;

        // 2. Assign each point to its nearest centroid
        members = vec![Vec::new(); k];
        for (i, point) in data.iter().enumerate() {
            members[nearest(point, &centroids, metric)].push(i);
        }

        // 3. Recompute centroids; an emptied cluster keeps its last position
        let mut displacement = 0.0;
        for (c, indices) in members.iter().enumerate() {
            if indices.is_empty() {
                continue;
            }
            let next = centroid_of(data, indices, dim);
            if !next.is_finite() {
                return Err(ClusterError::NonFinite {
                    stage: "centroid update",
                });
            }
            displacement += metric.distance(&centroids[c], &next);
            centroids[c] = next;
        }
        if !displacement.is_finite() {
            return Err(ClusterError::NonFinite {
                stage: "centroid displacement",
            });
        }
        displacements.push(displacement);

        if on_cadence(iteration, ctl.report_every()) {
            ctl.report(Progress::Iteration {
                iteration,
                max_iterations: params.max_iterations,
            });
        }

        if displacement <= params.tolerance {
            converged = true;
            break;
        }
    }

    Ok(KMeansFit {
        members,
        centroids,
        iterations,
        converged,
        displacements,
    })
}

/// Index of the closest centroid; ties go to the lowest index
fn nearest(point: &Point, centroids: &[Point], metric: Metric) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, center) in centroids.iter().enumerate() {
        let d = metric.distance(point, center);
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}
