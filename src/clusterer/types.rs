use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::clusterer::centroid::centroid_of;
use crate::clusterer::error::{ClusterError, Result};
use crate::clusterer::hierarchical::Dendrogram;

/// A point with a fixed number of numeric coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Point(Vec<f64>);

impl Point {
    pub fn new(coords: Vec<f64>) -> Self {
        Self(coords)
    }

    pub fn origin(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    pub fn coords(&self) -> &[f64] {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }
}

impl From<Vec<f64>> for Point {
    fn from(coords: Vec<f64>) -> Self {
        Self(coords)
    }
}

impl<const N: usize> From<[f64; N]> for Point {
    fn from(coords: [f64; N]) -> Self {
        Self(coords.to_vec())
    }
}

/// Ordered, index-stable collection of points handed over by preprocessing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    points: Vec<Point>,
    /// Optional ground-truth class per point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
}

impl Dataset {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            labels: None,
        }
    }

    /// Attach ground-truth labels; ignored unless there is one per point
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        if labels.len() == self.points.len() {
            self.labels = Some(labels);
        }
        self
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn ground_truth(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    /// SHA-256 over the coordinates, used as the snapshot reference of a job
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for point in &self.points {
            hasher.update((point.dim() as u64).to_le_bytes());
            for c in point.coords() {
                hasher.update(c.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

impl From<Vec<Point>> for Dataset {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

/// Check the shared preconditions of every algorithm and return the dimension
pub(crate) fn validate_points(data: &[Point]) -> Result<usize> {
    let first = data.first().ok_or(ClusterError::EmptyInput)?;
    let dim = first.dim();
    if let Some(p) = data.iter().find(|p| p.dim() != dim) {
        return Err(ClusterError::DimensionMismatch {
            expected: dim,
            found: p.dim(),
        });
    }
    Ok(dim)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Kmeans,
    Dbscan,
    Hierarchical,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Kmeans => "kmeans",
            Algorithm::Dbscan => "dbscan",
            Algorithm::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u32,
    /// Indices into the dataset the result was produced from
    pub indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Point>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResult {
    pub algorithm: Algorithm,
    pub clusters: Vec<Cluster>,
    /// Unclustered indices (DBSCAN only)
    #[serde(default)]
    pub noise: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dendrogram: Option<Dendrogram>,
    /// Wall-clock milliseconds spent in the algorithm
    #[serde(rename = "executionTime")]
    pub execution_time_ms: f64,
}

impl ClusterResult {
    /// Per-point cluster id, `None` for noise
    pub fn labels(&self, n: usize) -> Vec<Option<u32>> {
        let mut labels = vec![None; n];
        for cluster in &self.clusters {
            for &i in &cluster.indices {
                if i < n {
                    labels[i] = Some(cluster.id);
                }
            }
        }
        labels
    }

    /// Clusters with a centroid filled in wherever the algorithm left none
    pub fn display_centroids(&self, data: &Dataset) -> Vec<Cluster> {
        self.clusters
            .iter()
            .map(|c| {
                let mut c = c.clone();
                let first = c.indices.first().and_then(|&i| data.points().get(i));
                match first {
                    Some(first) if c.centroid.is_none() => {
                        c.centroid = Some(centroid_of(data.points(), &c.indices, first.dim()));
                    }
                    _ => {}
                }
                c
            })
            .collect()
    }
}
