pub mod codec;
pub mod convert;
pub mod embedding;
pub mod error;
pub mod format;
pub mod graph;
pub mod training;
mod types;

pub use convert::{ConvertOptions, ConvertSummary, LoadedGraph, convert, convert_with_index, load_graph, write_node_index};
pub use embedding::Embedding;
pub use error::{ParseDiagnostic, Result, SourceSpan, XgfsError};
pub use graph::{CsrGraph, IdPolicy, NodeIdentity};
pub use training::{Similarity, TrainingArrays, TrainingConfig};
pub use types::{InputFormat, MAX_EDGES, MAX_NODES, NodeId};
