use serde::Serialize;
use tracing::debug;

use crate::embedding::Embedding;
use crate::error::{Result, XgfsError};
use crate::graph::CsrGraph;

/// Node similarity the trainer approximates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Similarity {
    /// Personalized PageRank with restart probability `alpha`.
    PersonalizedPageRank { alpha: f64 },
    /// Direct adjacency.
    Adjacency,
}

impl Default for Similarity {
    fn default() -> Self {
        Similarity::PersonalizedPageRank { alpha: 0.85 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingConfig {
    pub dimensions: usize,
    pub steps: u64,
    pub negative_samples: usize,
    pub learning_rate: f32,
    pub similarity: Similarity,
    /// 0 seeds from the clock.
    pub seed: u64,
    /// Negative values count back from `available_cores + 1`; 0 is invalid.
    pub threads: i32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dimensions: 128,
            steps: 100_000,
            negative_samples: 3,
            learning_rate: 0.0025,
            similarity: Similarity::default(),
            seed: 0,
            threads: -1,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(XgfsError::InvalidParameter(
                "dimensions must be > 0".to_string(),
            ));
        }
        if self.steps == 0 {
            return Err(XgfsError::InvalidParameter("steps must be > 0".to_string()));
        }
        if self.negative_samples == 0 {
            return Err(XgfsError::InvalidParameter(
                "negative_samples must be > 0".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(XgfsError::InvalidParameter(
                "learning_rate must be finite and > 0".to_string(),
            ));
        }
        if let Similarity::PersonalizedPageRank { alpha } = self.similarity {
            if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
                return Err(XgfsError::InvalidParameter(
                    "alpha must be in [0,1]".to_string(),
                ));
            }
        }
        if self.threads == 0 {
            return Err(XgfsError::InvalidParameter(
                "threads can not be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker count given `available` cores.
    pub fn resolve_threads(&self, available: usize) -> Result<usize> {
        let resolved = if self.threads < 0 {
            available as i64 + 1 + self.threads as i64
        } else {
            self.threads as i64
        };
        if resolved <= 0 {
            return Err(XgfsError::InvalidParameter(format!(
                "threads = {} leaves no workers on {} cores",
                self.threads, available
            )));
        }
        Ok(resolved as usize)
    }

    pub fn resolve_threads_auto(&self) -> Result<usize> {
        self.resolve_threads(num_cpus::get())
    }

    /// An initial embedding must hold one row of `dimensions` per node.
    pub fn check_initial(&self, embedding: &Embedding, nodes: usize) -> Result<()> {
        if embedding.shape() != (nodes, self.dimensions) {
            let (rows, dims) = embedding.shape();
            return Err(XgfsError::InvalidParameter(format!(
                "initial embedding is {}x{}, expected {}x{}",
                rows, dims, nodes, self.dimensions
            )));
        }
        Ok(())
    }
}

/// Arrays in the layout the trainer reads: `offsets` has `N + 1` entries
/// ending in `E`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingArrays {
    pub offsets: Vec<i32>,
    pub neighbors: Vec<i32>,
}

impl TrainingArrays {
    pub fn from_graph(graph: &CsrGraph) -> Result<Self> {
        let to_i32 = |v: u32| {
            i32::try_from(v).map_err(|_| {
                XgfsError::Limit(format!("{} does not fit a 32-bit trainer index", v))
            })
        };
        let mut offsets = graph
            .offsets()
            .iter()
            .map(|&o| to_i32(o))
            .collect::<Result<Vec<_>>>()?;
        offsets.push(to_i32(graph.edge_count() as u32)?);
        let neighbors = graph
            .neighbor_ids()
            .iter()
            .map(|&n| to_i32(n))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "training arrays prepared"
        );
        Ok(Self { offsets, neighbors })
    }

    pub fn node_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.neighbors.len()
    }
}
