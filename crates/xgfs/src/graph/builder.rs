use tracing::debug;

use crate::error::{Result, XgfsError};
use crate::types::NodeId;

use super::csr::{AdjacencySet, CsrGraph, assemble};
use super::identity::NodeIdentity;

/// Default allowed deviation from 1 for a weight field in an unweighted format.
pub const DEFAULT_WEIGHT_TOLERANCE: f64 = 1e-4;

/// How a format treats weight fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightPolicy {
    /// Weights are data; each must be finite and strictly positive.
    Weighted,
    /// Weights are unsupported. A weight field is tolerated only when it is 1
    /// within `tolerance`, and the stored weight is then exactly 1.
    Unweighted { tolerance: f64 },
}

impl WeightPolicy {
    pub fn unweighted() -> Self {
        WeightPolicy::Unweighted {
            tolerance: DEFAULT_WEIGHT_TOLERANCE,
        }
    }

    pub fn resolve(&self, raw: Option<f64>) -> Result<f32> {
        let Some(raw) = raw else {
            return Ok(1.0);
        };
        match *self {
            WeightPolicy::Weighted => {
                let weight = raw as f32;
                if !raw.is_finite() || !weight.is_finite() || weight <= 0.0 {
                    return Err(XgfsError::weight(format!(
                        "weight {} is not a finite positive number",
                        raw
                    )));
                }
                Ok(weight)
            }
            WeightPolicy::Unweighted { tolerance } => {
                if !((raw - 1.0).abs() <= tolerance) {
                    return Err(XgfsError::weight(format!(
                        "format does not support weights, found {}",
                        raw
                    )));
                }
                Ok(1.0)
            }
        }
    }
}

/// Second-pass accumulator: resolves labels through a locked [`NodeIdentity`]
/// and collects deduplicated adjacency sets.
#[derive(Debug)]
pub struct GraphBuilder {
    identity: NodeIdentity,
    adjacency: Vec<AdjacencySet>,
    undirected: bool,
    policy: WeightPolicy,
}

impl GraphBuilder {
    pub fn new(identity: NodeIdentity, undirected: bool, policy: WeightPolicy) -> Self {
        let adjacency = vec![AdjacencySet::new(); identity.len()];
        GraphBuilder {
            identity,
            adjacency,
            undirected,
            policy,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn add_edge(&mut self, source: &str, target: &str, weight: Option<f64>) -> Result<()> {
        self.add_record(source, &[target], weight)
    }

    /// Connect `source` to every target, all with the same weight.
    pub fn add_record(&mut self, source: &str, targets: &[&str], weight: Option<f64>) -> Result<()> {
        let weight = self.policy.resolve(weight)?;
        let src = self.identity.resolve(source)?;
        for target in targets {
            let dst = self.identity.resolve(target)?;
            self.insert(src, dst, weight);
        }
        Ok(())
    }

    /// Insert a resolved edge. A repeated `(src, dst)` keeps the last weight.
    pub fn insert(&mut self, src: NodeId, dst: NodeId, weight: f32) {
        self.adjacency[src as usize].insert(dst, weight);
        if self.undirected && src != dst {
            self.adjacency[dst as usize].insert(src, weight);
        }
    }

    pub fn finish(self) -> Result<(CsrGraph, NodeIdentity)> {
        let graph = assemble(self.adjacency)?;
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            undirected = self.undirected,
            "adjacency assembled"
        );
        Ok((graph, self.identity))
    }
}
