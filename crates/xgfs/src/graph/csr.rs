use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::{Result, XgfsError};
use crate::types::{MAX_EDGES, MAX_NODES, NodeId};

/// Per-source adjacency: target -> weight. Keyed by target, so a repeated edge
/// keeps a single entry.
pub type AdjacencySet = BTreeMap<NodeId, f32>;

/// Compressed Sparse Row graph.
///
/// `offsets[i]` is the start of node `i`'s run in `neighbors`; the run ends at
/// `offsets[i + 1]`, or at the edge count for the last node. Runs are sorted
/// strictly ascending. `weights` is parallel to `neighbors` and always present
/// in memory; the codec decides whether to store it.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrGraph {
    offsets: Vec<u32>,
    neighbors: Vec<NodeId>,
    weights: Vec<f32>,
}

/// Build a CSR graph from per-node adjacency sets, indexed by source id.
pub fn assemble(adjacency: Vec<AdjacencySet>) -> Result<CsrGraph> {
    let num_nodes = adjacency.len();
    if num_nodes > MAX_NODES {
        return Err(XgfsError::Limit(format!(
            "{} nodes exceed the artifact limit of {}",
            num_nodes, MAX_NODES
        )));
    }
    let num_edges: usize = adjacency.iter().map(BTreeMap::len).sum();
    if num_edges > MAX_EDGES {
        return Err(XgfsError::Limit(format!(
            "{} edges exceed the artifact limit of {}",
            num_edges, MAX_EDGES
        )));
    }

    let mut offsets = Vec::with_capacity(num_nodes);
    let mut neighbors = Vec::with_capacity(num_edges);
    let mut weights = Vec::with_capacity(num_edges);

    for set in adjacency {
        offsets.push(neighbors.len() as u32);
        for (target, weight) in set {
            neighbors.push(target);
            weights.push(weight);
        }
    }

    Ok(CsrGraph {
        offsets,
        neighbors,
        weights,
    })
}

impl CsrGraph {
    pub fn empty() -> Self {
        CsrGraph {
            offsets: Vec::new(),
            neighbors: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Build from raw arrays, checking every structural invariant. A missing
    /// weight array means all weights are 1.
    pub fn from_parts(
        offsets: Vec<u32>,
        neighbors: Vec<NodeId>,
        weights: Option<Vec<f32>>,
    ) -> Result<Self> {
        let weights = weights.unwrap_or_else(|| vec![1.0; neighbors.len()]);
        let graph = CsrGraph {
            offsets,
            neighbors,
            weights,
        };
        graph.validate()?;
        Ok(graph)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.offsets.len();
        let e = self.neighbors.len();
        if n > MAX_NODES || e > MAX_EDGES {
            return Err(XgfsError::Limit(format!(
                "graph with {} nodes and {} edges exceeds the artifact limits",
                n, e
            )));
        }
        if self.weights.len() != e {
            return Err(XgfsError::Codec(format!(
                "weights length {} does not match edge count {}",
                self.weights.len(),
                e
            )));
        }
        if n == 0 {
            if e != 0 {
                return Err(XgfsError::Codec(format!(
                    "{} edges in a graph without nodes",
                    e
                )));
            }
            return Ok(());
        }
        if self.offsets[0] != 0 {
            return Err(XgfsError::Codec(format!(
                "first offset must be 0, found {}",
                self.offsets[0]
            )));
        }
        for node in 0..n {
            let start = self.offsets[node] as usize;
            let end = self.run_end(node);
            if start > end || end > e {
                return Err(XgfsError::Codec(format!(
                    "offsets of node {} describe invalid range {}..{} (edge count {})",
                    node, start, end, e
                )));
            }
            let run = &self.neighbors[start..end];
            for (i, &target) in run.iter().enumerate() {
                if target as usize >= n {
                    return Err(XgfsError::Codec(format!(
                        "node {} has neighbor {} outside 0..{}",
                        node, target, n
                    )));
                }
                if i > 0 && run[i - 1] >= target {
                    return Err(XgfsError::Codec(format!(
                        "neighbors of node {} are not strictly ascending at {}",
                        node, target
                    )));
                }
            }
        }
        if let Some(bad) = self
            .weights
            .iter()
            .find(|w| !(w.is_finite() && **w > 0.0))
        {
            return Err(XgfsError::Codec(format!(
                "weight {} is not strictly positive",
                bad
            )));
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn edge_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn neighbor_ids(&self) -> &[NodeId] {
        &self.neighbors
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn run_end(&self, node: usize) -> usize {
        match self.offsets.get(node + 1) {
            Some(&next) => next as usize,
            None => self.neighbors.len(),
        }
    }

    /// Edge index range of `node`, empty when out of range.
    pub fn row_range(&self, node: NodeId) -> Range<usize> {
        let idx = node as usize;
        if idx >= self.offsets.len() {
            return 0..0;
        }
        self.offsets[idx] as usize..self.run_end(idx)
    }

    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.neighbors[self.row_range(node)]
    }

    pub fn edge_weights(&self, node: NodeId) -> &[f32] {
        &self.weights[self.row_range(node)]
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.row_range(node).len()
    }

    pub fn max_degree(&self) -> usize {
        (0..self.node_count() as NodeId)
            .map(|n| self.degree(n))
            .max()
            .unwrap_or(0)
    }

    /// True when every weight is exactly 1, i.e. the artifact can omit them.
    pub fn has_unit_weights(&self) -> bool {
        self.weights.iter().all(|&w| w == 1.0)
    }

    /// All `(source, target, weight)` triples in storage order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, f32)> + '_ {
        (0..self.node_count() as NodeId).flat_map(move |src| {
            let range = self.row_range(src);
            self.neighbors[range.clone()]
                .iter()
                .zip(&self.weights[range])
                .map(move |(&dst, &w)| (src, dst, w))
        })
    }

    pub fn contains_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.neighbors(source).binary_search(&target).is_ok()
    }

    /// Union with the transpose. Where both `(u, v)` and `(v, u)` are present
    /// both directions take the larger of the two weights, so an already
    /// symmetric graph comes back unchanged.
    pub fn symmetrize(&self) -> Result<CsrGraph> {
        let mut adjacency = self.to_adjacency();
        for (src, dst, w) in self.edges() {
            let slot = adjacency[dst as usize].entry(src).or_insert(w);
            if w > *slot {
                *slot = w;
            }
        }
        assemble(adjacency)
    }

    pub fn to_adjacency(&self) -> Vec<AdjacencySet> {
        (0..self.node_count() as NodeId)
            .map(|src| {
                self.neighbors(src)
                    .iter()
                    .copied()
                    .zip(self.edge_weights(src).iter().copied())
                    .collect()
            })
            .collect()
    }
}
