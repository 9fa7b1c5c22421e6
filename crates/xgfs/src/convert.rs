use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::codec;
use crate::error::{Result, XgfsError};
use crate::format::{TextReader, read_sparse_matrix};
use crate::graph::{CsrGraph, DEFAULT_WEIGHT_TOLERANCE, IdPolicy, NodeIdentity};
use crate::types::InputFormat;

pub const DEFAULT_MAT_VARIABLE: &str = "network";
pub const ENV_MAT_VARIABLE: &str = "XGFS_MATFILE_VARIABLE";
pub const ENV_WEIGHT_TOLERANCE: &str = "XGFS_WEIGHT_TOLERANCE";

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub format: InputFormat,
    pub undirected: bool,
    /// Field separator for text formats; whitespace runs when `None`.
    pub separator: Option<String>,
    /// Variable holding the sparse matrix inside a MAT file.
    pub mat_variable: String,
    /// Allowed deviation from 1 for weight fields of unweighted formats.
    pub weight_tolerance: f64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: InputFormat::EdgeList,
            undirected: false,
            separator: None,
            mat_variable: DEFAULT_MAT_VARIABLE.to_string(),
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
        }
    }
}

impl ConvertOptions {
    /// Defaults overlaid with `XGFS_MATFILE_VARIABLE` and
    /// `XGFS_WEIGHT_TOLERANCE`. Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            mat_variable: parse_env_string(ENV_MAT_VARIABLE, &defaults.mat_variable),
            weight_tolerance: parse_env_tolerance(ENV_WEIGHT_TOLERANCE, defaults.weight_tolerance),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.weight_tolerance.is_finite() || self.weight_tolerance < 0.0 {
            return Err(XgfsError::InvalidParameter(format!(
                "weight tolerance must be finite and >= 0, got {}",
                self.weight_tolerance
            )));
        }
        if let Some(sep) = &self.separator {
            if sep.is_empty() {
                return Err(XgfsError::InvalidParameter(
                    "separator must not be empty".to_string(),
                ));
            }
        }
        if self.format == InputFormat::SparseMatrix && self.mat_variable.is_empty() {
            return Err(XgfsError::InvalidParameter(
                "MAT variable name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env_string(name: &str, default: &str) -> String {
    non_empty(std::env::var(name).ok()).unwrap_or_else(|| default.to_string())
}

fn parse_env_tolerance(name: &str, default: f64) -> f64 {
    parse_tolerance(std::env::var(name).ok()).unwrap_or(default)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_tolerance(raw: Option<String>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// A converted graph plus its label mapping. MAT inputs carry no labels.
#[derive(Debug, Clone)]
pub struct LoadedGraph {
    pub graph: CsrGraph,
    pub identity: Option<NodeIdentity>,
}

/// Report of a finished conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertSummary {
    pub format: InputFormat,
    pub nodes: usize,
    pub edges: usize,
    pub undirected: bool,
    pub weights_stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_policy: Option<IdPolicy>,
    pub bytes: usize,
}

/// Read `input` into CSR form without writing anything.
pub fn load_graph(input: &Path, options: &ConvertOptions) -> Result<LoadedGraph> {
    options.validate()?;
    match options.format {
        InputFormat::SparseMatrix => {
            let matrix = read_sparse_matrix(input, &options.mat_variable)?;
            let mut graph = matrix.to_csr()?;
            if options.undirected {
                graph = graph.symmetrize()?;
            }
            Ok(LoadedGraph {
                graph,
                identity: None,
            })
        }
        format => {
            let reader = TextReader::new(
                format,
                options.separator.as_deref(),
                options.undirected,
                options.weight_tolerance,
            )?;
            let (graph, identity) = reader.read_file(input)?;
            Ok(LoadedGraph {
                graph,
                identity: Some(identity),
            })
        }
    }
}

pub fn summarize(loaded: &LoadedGraph, options: &ConvertOptions) -> ConvertSummary {
    ConvertSummary {
        format: options.format,
        nodes: loaded.graph.node_count(),
        edges: loaded.graph.edge_count(),
        undirected: options.undirected,
        weights_stored: !loaded.graph.has_unit_weights(),
        id_policy: loaded.identity.as_ref().map(NodeIdentity::policy),
        bytes: codec::encoded_len(&loaded.graph),
    }
}

/// Convert `input` to an artifact at `output`. Nothing is written unless the
/// whole input parses.
pub fn convert(input: &Path, output: &Path, options: &ConvertOptions) -> Result<ConvertSummary> {
    convert_with_index(input, output, None, options)
}

/// [`convert`], also writing the `row,label` node index to `index` when given.
/// The index needs a text format. If it cannot be written the artifact is
/// removed again.
pub fn convert_with_index(
    input: &Path,
    output: &Path,
    index: Option<&Path>,
    options: &ConvertOptions,
) -> Result<ConvertSummary> {
    if index.is_some() && !options.format.is_text() {
        return Err(XgfsError::InvalidParameter(format!(
            "a node index needs a text input format; '{}' inputs carry no labels",
            options.format
        )));
    }
    let loaded = load_graph(input, options)?;
    codec::write_file(&loaded.graph, output)?;
    if let (Some(index_path), Some(identity)) = (index, loaded.identity.as_ref()) {
        if let Err(err) = write_node_index(identity, index_path) {
            let _ = std::fs::remove_file(output);
            return Err(err);
        }
    }
    let summary = summarize(&loaded, options);
    info!(
        input = %input.display(),
        output = %output.display(),
        nodes = summary.nodes,
        edges = summary.edges,
        weights_stored = summary.weights_stored,
        "conversion complete"
    );
    Ok(summary)
}

/// Write `row,label` lines for every node, atomically.
pub fn write_node_index(identity: &NodeIdentity, path: &Path) -> Result<()> {
    codec::write_atomic(path, |writer| identity.write_index(writer))
}
