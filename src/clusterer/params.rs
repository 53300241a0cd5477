use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clusterer::centroid::InitMethod;
use crate::clusterer::error::{ClusterError, Result};
use crate::clusterer::hierarchical::Linkage;
use crate::clusterer::similarity::Metric;
use crate::clusterer::types::Algorithm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    /// Stop once total centroid displacement falls below this
    pub tolerance: f64,
    pub init_method: InitMethod,
    pub metric: Metric,
    /// Fixed seed for reproducible runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            k: 3,
            max_iterations: 100,
            tolerance: 1e-4,
            init_method: InitMethod::KmeansPlusPlus,
            metric: Metric::Euclidean,
            seed: None,
        }
    }
}

impl KMeansParams {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_init(mut self, init_method: InitMethod) -> Self {
        self.init_method = init_method;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "k",
                message: "must be positive",
            });
        }
        if self.max_iterations == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "maxIterations",
                message: "must be positive",
            });
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ClusterError::InvalidParameter {
                name: "tolerance",
                message: "must be a finite, non-negative number",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DbscanParams {
    /// Neighborhood radius
    pub eps: f64,
    /// Neighborhood size (point included) that makes a core point
    pub min_pts: usize,
    pub metric: Metric,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_pts: 5,
            metric: Metric::Euclidean,
        }
    }
}

impl DbscanParams {
    pub fn new(eps: f64, min_pts: usize) -> Self {
        Self {
            eps,
            min_pts,
            metric: Metric::Euclidean,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(ClusterError::InvalidParameter {
                name: "eps",
                message: "must be a positive, finite number",
            });
        }
        if self.min_pts == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "minPts",
                message: "must be positive",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct HierarchicalParams {
    pub num_clusters: usize,
    pub linkage: Linkage,
    pub metric: Metric,
}

impl Default for HierarchicalParams {
    fn default() -> Self {
        Self {
            num_clusters: 3,
            linkage: Linkage::Average,
            metric: Metric::Euclidean,
        }
    }
}

impl HierarchicalParams {
    pub fn new(num_clusters: usize, linkage: Linkage) -> Self {
        Self {
            num_clusters,
            linkage,
            metric: Metric::Euclidean,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_clusters == 0 {
            return Err(ClusterError::InvalidParameter {
                name: "numClusters",
                message: "must be positive",
            });
        }
        Ok(())
    }
}

/// Parameter snapshot for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", content = "options", rename_all = "lowercase")]
pub enum AlgorithmParameters {
    Kmeans(KMeansParams),
    Dbscan(DbscanParams),
    Hierarchical(HierarchicalParams),
}

impl AlgorithmParameters {
    /// Build from the wire form: algorithm name plus an options object
    pub fn parse(algorithm: &str, options: &Value) -> Result<Self> {
        // Absent options mean "all defaults"
        let options = match options {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let malformed = |e: serde_json::Error| ClusterError::InvalidOptions(e.to_string());

        let params = match algorithm {
            "kmeans" => Self::Kmeans(serde_json::from_value(options).map_err(malformed)?),
            "dbscan" => Self::Dbscan(serde_json::from_value(options).map_err(malformed)?),
            "hierarchical" => {
                Self::Hierarchical(serde_json::from_value(options).map_err(malformed)?)
            }
            other => return Err(ClusterError::UnknownAlgorithm(other.to_string())),
        };
        params.validate()?;
        Ok(params)
    }

    /// Options object for the wire form
    pub fn options(&self) -> Value {
        let value = match self {
            Self::Kmeans(p) => serde_json::to_value(p),
            Self::Dbscan(p) => serde_json::to_value(p),
            Self::Hierarchical(p) => serde_json::to_value(p),
        };
        // Plain structs of numbers and unit enums always serialize
        value.unwrap_or(Value::Null)
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Kmeans(_) => Algorithm::Kmeans,
            Self::Dbscan(_) => Algorithm::Dbscan,
            Self::Hierarchical(_) => Algorithm::Hierarchical,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Kmeans(p) => p.validate(),
            Self::Dbscan(p) => p.validate(),
            Self::Hierarchical(p) => p.validate(),
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            Self::Kmeans(p) => p.metric,
            Self::Dbscan(p) => p.metric,
            Self::Hierarchical(p) => p.metric,
        }
    }
}

impl Default for AlgorithmParameters {
    fn default() -> Self {
        Self::Kmeans(KMeansParams::default())
    }
}

impl From<KMeansParams> for AlgorithmParameters {
    fn from(p: KMeansParams) -> Self {
        Self::Kmeans(p)
    }
}

impl From<DbscanParams> for AlgorithmParameters {
    fn from(p: DbscanParams) -> Self {
        Self::Dbscan(p)
    }
}

impl From<HierarchicalParams> for AlgorithmParameters {
    fn from(p: HierarchicalParams) -> Self {
        Self::Hierarchical(p)
    }
}
