// Public API exports
pub mod clusterer;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod quality;

// Re-export main types for convenience
pub use clusterer::{
    Algorithm, AlgorithmParameters, Cluster, ClusterError, ClusterResult, Dataset, DbscanParams,
    Dendrogram, HierarchicalParams, KMeansParams, Linkage, Metric, Point, dbscan, hierarchical,
    kmeans, run,
};

pub use config::{ConfigError, PlaygroundConfig};

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorEvent, JobState, Status,
    StatusKind,
};

pub use executor::{Event, Executor, ExecutorConfig, ExecutorHandle, JobId, Request};

pub use quality::{QualityAssessor, QualityMetrics, SilhouetteAssessor};
