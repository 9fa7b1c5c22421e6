pub mod builder;
pub mod csr;
pub mod identity;

pub use builder::{DEFAULT_WEIGHT_TOLERANCE, GraphBuilder, WeightPolicy};
pub use csr::{AdjacencySet, CsrGraph, assemble};
pub use identity::{IdPolicy, LabelScan, NodeIdentity};
