//! Agglomerative (bottom-up) clustering.
//!
//! Every point starts as its own cluster. Each round the closest pair of
//! clusters under the chosen [`Linkage`] is merged and the merge is recorded
//! in a [`Dendrogram`], until `num_clusters` remain.
//!
//! | Linkage | Cluster distance |
//! |---------|------------------|
//! | Single | min pairwise point distance |
//! | Complete | max pairwise point distance |
//! | Average | mean pairwise point distance |
//! | Ward | `SS(A ∪ B) - SS(A) - SS(B)` |
//!
//! The merge loop only sees clusters through [`ClusterDistance`], so an
//! indexed or cached linkage can replace [`NaiveLinkage`] without touching it.
//!
//! Ordering is pinned: pairs are scanned `(i, j)` with `i < j` in list order,
//! a strictly smaller distance is needed to replace the best pair, and a merge
//! removes both inputs and appends the merged cluster at the end of the list.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::clusterer::{
    centroid::centroid_of,
    error::{ClusterError, Result},
    params::HierarchicalParams,
    progress::{Progress, RunControl, on_cadence},
    similarity::Metric,
    types::{Algorithm, Cluster, ClusterResult, Point, validate_points},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Single,
    Complete,
    #[default]
    Average,
    Ward,
}

impl Linkage {
    /// Distance between the clusters whose members are `a` and `b`
    pub fn distance(&self, data: &[Point], a: &[usize], b: &[usize], metric: Metric) -> f64 {
        match self {
            Linkage::Single => pairwise(data, a, b, metric).fold(f64::INFINITY, f64::min),
            Linkage::Complete => pairwise(data, a, b, metric).fold(0.0, f64::max),
            Linkage::Average => {
                let total: f64 = pairwise(data, a, b, metric).sum();
                total / (a.len() * b.len()) as f64
            }
            Linkage::Ward => {
                let merged: Vec<usize> = a.iter().chain(b).copied().collect();
                sum_of_squares(data, &merged, metric)
                    - sum_of_squares(data, a, metric)
                    - sum_of_squares(data, b, metric)
            }
        }
    }
}

fn pairwise<'a>(
    data: &'a [Point],
    a: &'a [usize],
    b: &'a [usize],
    metric: Metric,
) -> impl Iterator<Item = f64> + 'a {
    a.iter()
        .flat_map(move |&i| b.iter().map(move |&j| metric.distance(&data[i], &data[j])))
}

/// Sum of squared distances from each member to the cluster centroid
fn sum_of_squares(data: &[Point], members: &[usize], metric: Metric) -> f64 {
    let Some(&first) = members.first() else {
        return 0.0;
    };
    let center = centroid_of(data, members, data[first].dim());
    members
        .iter()
        .map(|&i| metric.distance(&data[i], &center).powi(2))
        .sum()
}

/// Distance between two clusters, as seen by the merge loop
pub trait ClusterDistance {
    fn between(&self, data: &[Point], a: &[usize], b: &[usize]) -> f64;
}

/// Recomputes the linkage from scratch for every pair
#[derive(Debug, Clone, Copy)]
pub struct NaiveLinkage {
    pub linkage: Linkage,
    pub metric: Metric,
}

impl ClusterDistance for NaiveLinkage {
    fn between(&self, data: &[Point], a: &[usize], b: &[usize]) -> f64 {
        self.linkage.distance(data, a, b, self.metric)
    }
}

/// One merge in the dendrogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Merge {
    pub id1: usize,
    pub id2: usize,
    pub distance: f64,
    /// Leaves are `0..n`; merge `i` creates `n + i`
    pub merged_id: usize,
    pub size: usize,
}

/// Ordered merge history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dendrogram {
    n_items: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    pub fn new(n_items: usize) -> Self {
        Self {
            n_items,
            merges: Vec::with_capacity(n_items.saturating_sub(1)),
        }
    }

    /// Record a merge and return the id of the new cluster
    pub fn add_merge(&mut self, id1: usize, id2: usize, distance: f64, size: usize) -> usize {
        let merged_id = self.n_items + self.merges.len();
        self.merges.push(Merge {
            id1,
            id2,
            distance,
            merged_id,
            size,
        });
        merged_id
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn distances(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }

    /// Replay merges until `k` clusters remain and return their members
    ///
    /// Clusters come back ordered by their smallest member index.
    pub fn cut(&self, k: usize) -> Result<Vec<Vec<usize>>> {
        let fewest = self.n_items.saturating_sub(self.merges.len());
        if k == 0 || k > self.n_items || k < fewest {
            return Err(ClusterError::InvalidClusterCount {
                requested: k,
                n_items: self.n_items,
            });
        }

        let mut groups: Vec<Option<Vec<usize>>> =
            (0..self.n_items).map(|i| Some(vec![i])).collect();
        for merge in &self.merges[..self.n_items - k] {
            let a = groups.get_mut(merge.id1).and_then(Option::take);
            let b = groups.get_mut(merge.id2).and_then(Option::take);
            let mut merged: Vec<usize> = a.into_iter().chain(b).flatten().collect();
            merged.sort_unstable();
            groups.push(Some(merged));
        }

        let mut clusters: Vec<Vec<usize>> = groups.into_iter().flatten().collect();
        clusters.sort_by_key(|c| c.first().copied());
        Ok(clusters)
    }
}

pub fn hierarchical<C: RunControl + ?Sized>(
    data: &[Point],
    params: &HierarchicalParams,
    ctl: &mut C,
) -> Result<ClusterResult> {
    let started = Instant::now();
    let dim = validate_points(data)?;
    params.validate()?;

    let linkage = NaiveLinkage {
        linkage: params.linkage,
        metric: params.metric,
    };
    let (groups, dendrogram) = agglomerate(data, params.num_clusters, &linkage, ctl)?;

    let mut clusters = Vec::with_capacity(groups.len());
    for (id, indices) in groups.into_iter().enumerate() {
        let centroid = centroid_of(data, &indices, dim);
        if !centroid.is_finite() {
            return Err(ClusterError::NonFinite { stage: "centroid" });
        }
        clusters.push(Cluster {
            id: id as u32,
            indices,
            centroid: Some(centroid),
        });
    }

    Ok(ClusterResult {
        algorithm: Algorithm::Hierarchical,
        clusters,
        noise: Vec::new(),
        iterations: Some(dendrogram.merges().len()),
        converged: None,
        dendrogram: Some(dendrogram),
        execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Merge closest pairs until `target` clusters remain
pub fn agglomerate<D, C>(
    data: &[Point],
    target: usize,
    linkage: &D,
    ctl: &mut C,
) -> Result<(Vec<Vec<usize>>, Dendrogram)>
where
    D: ClusterDistance + ?Sized,
    C: RunControl + ?Sized,
{
    let n = data.len();
    if target == 0 || target > n {
        return Err(ClusterError::InvalidClusterCount {
            requested: target,
            n_items: n,
        });
    }

    let mut dendrogram = Dendrogram::new(n);
    // (dendrogram id, sorted members)
    let mut active: Vec<(usize, Vec<usize>)> = (0..n).map(|i| (i, vec![i])).collect();

    while active.len() > target {
        ctl.checkpoint()?;

        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..active.len() {
            for j in (i + 1)..active.len() {
                let d = linkage.between(data, &active[i].1, &active[j].1);
                if d.is_nan() {
                    return Err(ClusterError::NonFinite { stage: "linkage" });
                }
                if best.map_or(true, |(_, _, bd)| d < bd) {
                    best = Some((i, j, d));
                }
            }
        }
        let Some((i, j, distance)) = best else {
            break;
        };
        if !distance.is_finite() {
            return Err(ClusterError::NonFinite { stage: "linkage" });
        }

        // j > i, so removing j first leaves i in place
        let (id2, b) = active.remove(j);
        let (id1, a) = active.remove(i);
        let mut members = a;
        members.extend(b);
        members.sort_unstable();

        let merged_id = dendrogram.add_merge(id1, id2, distance, members.len());
        active.push((merged_id, members));

        let merges = dendrogram.merges().len();
        if on_cadence(merges, ctl.report_every()) || active.len() == target {
            ctl.report(Progress::Merge {
                clusters_remaining: active.len(),
                target_clusters: target,
                merges,
            });
        }
    }

    Ok((active.into_iter().map(|(_, m)| m).collect(), dendrogram))
}
