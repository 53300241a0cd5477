//! Post-hoc quality assessment of a clustering.
//!
//! The coordinator only depends on [`QualityAssessor`]; [`SilhouetteAssessor`]
//! is the implementation the playground ships with.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clusterer::{Cluster, Dataset, Metric};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    /// Blend of internal and external scores, in `[0, 1]`
    pub overall_score: f64,
    /// Score from the data alone, in `[0, 1]`
    pub internal_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub summary: QualitySummary,
    /// Mean silhouette coefficient, in `[-1, 1]`
    pub silhouette: f64,
    /// Agreement with ground-truth labels, when the dataset has them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purity: Option<f64>,
    pub cluster_count: usize,
    pub noise_ratio: f64,
}

/// Scores a finished clustering
pub trait QualityAssessor: Send {
    /// `metric` is the distance the clustering was computed under
    fn evaluate(
        &self,
        data: &Dataset,
        clusters: &[Cluster],
        metric: Metric,
        ground_truth: Option<&[String]>,
    ) -> Result<QualityMetrics>;
}

/// Silhouette for internal quality, purity for external quality
#[derive(Debug, Clone)]
pub struct SilhouetteAssessor {
    /// Upper bound on points scored; larger datasets are sampled by stride
    max_points: usize,
}

impl SilhouetteAssessor {
    pub fn new() -> Self {
        Self { max_points: 2000 }
    }

    pub fn max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points.max(1);
        self
    }

    fn silhouette(
        &self,
        data: &Dataset,
        clusters: &[&Cluster],
        owner: &[Option<usize>],
        metric: Metric,
    ) -> f64 {
        if clusters.len() < 2 {
            return 0.0;
        }

        let clustered: Vec<usize> = (0..data.len()).filter(|&i| owner[i].is_some()).collect();
        let stride = clustered.len().div_ceil(self.max_points).max(1);
        let points = data.points();

        let mut total = 0.0;
        let mut scored = 0usize;
        for &i in clustered.iter().step_by(stride) {
            let Some(own) = owner[i] else { continue };
            scored += 1;
            if clusters[own].len() < 2 {
                // singleton clusters score 0
                continue;
            }

            let mean_to = |c: &Cluster| {
                let sum: f64 = c
                    .indices
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| metric.distance(&points[i], &points[j]))
                    .sum();
                let count = c.indices.iter().filter(|&&j| j != i).count();
                sum / count as f64
            };

            let a = mean_to(clusters[own]);
            let b = clusters
                .iter()
                .enumerate()
                .filter(|(c, _)| *c != own)
                .map(|(_, c)| mean_to(*c))
                .fold(f64::INFINITY, f64::min);

            let scale = a.max(b);
            if scale > 0.0 && scale.is_finite() {
                total += (b - a) / scale;
            }
        }

        if scored == 0 {
            0.0
        } else {
            total / scored as f64
        }
    }
}

impl Default for SilhouetteAssessor {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityAssessor for SilhouetteAssessor {
    fn evaluate(
        &self,
        data: &Dataset,
        clusters: &[Cluster],
        metric: Metric,
        ground_truth: Option<&[String]>,
    ) -> Result<QualityMetrics> {
        let n = data.len();
        if let Some(labels) = ground_truth {
            if labels.len() != n {
                bail!("expected {} ground-truth labels, got {}", n, labels.len());
            }
        }

        let non_empty: Vec<&Cluster> = clusters.iter().filter(|c| !c.is_empty()).collect();
        let mut owner = vec![None; n];
        for (c, cluster) in non_empty.iter().enumerate() {
            for &i in &cluster.indices {
                if i >= n {
                    bail!("cluster {} references point {} outside the dataset", cluster.id, i);
                }
                owner[i] = Some(c);
            }
        }
        let clustered = owner.iter().filter(|o| o.is_some()).count();

        let silhouette = self.silhouette(data, &non_empty, &owner, metric);
        let purity = ground_truth.map(|labels| purity(&non_empty, labels, clustered));

        let internal_score = (silhouette + 1.0) / 2.0;
        let overall_score = match purity {
            Some(p) => (internal_score + p) / 2.0,
            None => internal_score,
        };

        Ok(QualityMetrics {
            summary: QualitySummary {
                overall_score,
                internal_score,
                recommendation: recommend(overall_score).to_string(),
            },
            silhouette,
            purity,
            cluster_count: non_empty.len(),
            noise_ratio: if n == 0 {
                0.0
            } else {
                (n - clustered) as f64 / n as f64
            },
        })
    }
}

/// Share of clustered points that carry their cluster's majority label
fn purity(clusters: &[&Cluster], labels: &[String], clustered: usize) -> f64 {
    if clustered == 0 {
        return 0.0;
    }
    let correct: usize = clusters
        .iter()
        .map(|c| {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for &i in &c.indices {
                *counts.entry(labels[i].as_str()).or_insert(0) += 1;
            }
            counts.values().copied().max().unwrap_or(0)
        })
        .sum();
    correct as f64 / clustered as f64
}

fn recommend(score: f64) -> &'static str {
    if score >= 0.75 {
        "Strong structure: clusters are compact and well separated"
    } else if score >= 0.5 {
        "Moderate structure: try tuning the parameters"
    } else {
        "Weak structure: consider a different algorithm or parameters"
    }
}
