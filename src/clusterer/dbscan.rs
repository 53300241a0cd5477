//! Density-based clustering with noise.
//!
//! A point is *core* when its `eps`-neighborhood (itself included) holds at
//! least `min_pts` points. Clusters grow breadth-first from core points;
//! non-core points reached during expansion join as *border* points, and
//! everything left over is noise.
//!
//! Neighborhoods are found by a linear scan, so a run costs O(n²) distance
//! evaluations.

use std::collections::VecDeque;
use std::time::Instant;

use crate::clusterer::{
    error::Result,
    params::DbscanParams,
    progress::{Progress, RunControl, on_cadence},
    types::{Algorithm, Cluster, ClusterResult, Point, validate_points},
};

pub fn dbscan<C: RunControl + ?Sized>(
    data: &[Point],
    params: &DbscanParams,
    ctl: &mut C,
) -> Result<ClusterResult> {
    let started = Instant::now();
    validate_points(data)?;
    params.validate()?;

    let n = data.len();
    let mut scan = Scan {
        data,
        params,
        visited: vec![false; n],
        labels: vec![None; n],
        clusters: Vec::new(),
    };

    for point in 0..n {
        ctl.checkpoint()?;
        if !scan.visited[point] {
            scan.visit(point, ctl)?;
        }

        let processed = point + 1;
        if on_cadence(processed, ctl.report_every()) || processed == n {
            ctl.report(Progress::Scan {
                processed,
                total: n,
            });
        }
    }

    let noise = (0..n).filter(|&i| scan.labels[i].is_none()).collect();
    let clusters = scan
        .clusters
        .into_iter()
        .enumerate()
        .map(|(id, mut indices)| {
            indices.sort_unstable();
            Cluster {
                id: id as u32,
                indices,
                centroid: None,
            }
        })
        .collect();

    Ok(ClusterResult {
        algorithm: Algorithm::Dbscan,
        clusters,
        noise,
        iterations: None,
        converged: None,
        dendrogram: None,
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Indices of every point within `eps` of `data[point]`, the point included
pub fn region_query(data: &[Point], point: usize, params: &DbscanParams) -> Vec<usize> {
    let center = &data[point];
    data.iter()
        .enumerate()
        .filter(|(_, other)| params.metric.distance(center, other) <= params.eps)
        .map(|(i, _)| i)
        .collect()
}

struct Scan<'a> {
    data: &'a [Point],
    params: &'a DbscanParams,
    visited: Vec<bool>,
    /// Cluster of each point; `None` is noise until a cluster claims it
    labels: Vec<Option<usize>>,
    clusters: Vec<Vec<usize>>,
}

impl Scan<'_> {
    fn visit<C: RunControl + ?Sized>(&mut self, point: usize, ctl: &mut C) -> Result<()> {
        self.visited[point] = true;
        let neighbors = region_query(self.data, point, self.params);
        if neighbors.len() < self.params.min_pts {
            return Ok(());
        }

        let cluster = self.clusters.len();
        self.clusters.push(vec![point]);
        self.labels[point] = Some(cluster);

        // A point is labeled as it enters the frontier, so it enters at most once
        let mut frontier = VecDeque::new();
        self.claim(cluster, neighbors, &mut frontier);
        while let Some(q) = frontier.pop_front() {
            ctl.checkpoint()?;
            if self.visited[q] {
                continue;
            }
            self.visited[q] = true;
            let reach = region_query(self.data, q, self.params);
            if reach.len() >= self.params.min_pts {
                self.claim(cluster, reach, &mut frontier);
            }
        }
        Ok(())
    }

    /// Add every unlabeled point to `cluster`; the first cluster to reach a point keeps it
    fn claim(&mut self, cluster: usize, points: Vec<usize>, frontier: &mut VecDeque<usize>) {
        for r in points {
            if self.labels[r].is_none() {
                self.labels[r] = Some(cluster);
                self.clusters[cluster].push(r);
                frontier.push_back(r);
            }
        }
    }
}
