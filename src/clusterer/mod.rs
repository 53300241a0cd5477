//! Clustering algorithms and the value types they share.
//!
//! Every algorithm takes an index-stable slice of [`Point`]s plus a
//! [`RunControl`] that receives progress and is polled for cancellation at
//! iteration, expansion, and merge boundaries.

mod centroid;
mod dbscan;
mod error;
mod hierarchical;
mod kmeans;
mod params;
mod progress;
mod similarity;
mod types;


pub use centroid::{InitMethod, centroid_of, compute_centroid, seed_centroids};
pub use dbscan::{dbscan, region_query};
pub use error::{ClusterError, ErrorKind, Result};
pub use hierarchical::{
    ClusterDistance, Dendrogram, Linkage, Merge, NaiveLinkage, agglomerate, hierarchical,
};
pub use kmeans::kmeans;
pub use params::{AlgorithmParameters, DbscanParams, HierarchicalParams, KMeansParams};
pub use progress::{Progress, RunControl, Unobserved};
pub use similarity::{Metric, cosine_distance, cosine_similarity};
pub use types::{Algorithm, Cluster, ClusterResult, Dataset, Point};

/// Run whichever algorithm `params` selects
pub fn run<C: RunControl + ?Sized>(
    data: &[Point],
    params: &AlgorithmParameters,
    ctl: &mut C,
) -> Result<ClusterResult> {
    match params {
        AlgorithmParameters::Kmeans(p) => kmeans(data, p, ctl),
        AlgorithmParameters::Dbscan(p) => dbscan(data, p, ctl),
        AlgorithmParameters::Hierarchical(p) => hierarchical(data, p, ctl),
    }
}
