pub mod matfile;
pub mod text;

pub use matfile::{SparseMatrix, read_sparse_matrix};
pub use text::{TextReader, Tokenizer};

use crate::error::{Result, SourceSpan, XgfsError};
use crate::graph::WeightPolicy;
use crate::types::InputFormat;

/// A token of an input line with its byte span in that line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: SourceSpan,
}

impl<'a> Token<'a> {
    /// `part` must be a subslice of `line`.
    pub(crate) fn within(line: &str, part: &'a str) -> Self {
        let start = part.as_ptr() as usize - line.as_ptr() as usize;
        Token {
            text: part,
            span: SourceSpan::new(start, start + part.len()),
        }
    }
}

/// One parsed line: a source connected to each target, with an optional
/// weight field.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    pub source: Token<'a>,
    pub targets: Vec<Token<'a>>,
    pub weight: Option<f64>,
}

/// Line parser of a text format. Checks the field count and weight syntax.
pub type LineParser = for<'a> fn(&[Token<'a>]) -> Result<Record<'a>>;

impl InputFormat {
    /// Per-format line parser; `None` for the sparse-matrix format.
    pub fn line_parser(&self) -> Option<LineParser> {
        match self {
            InputFormat::SparseMatrix => None,
            InputFormat::EdgeList => Some(parse_edge_list),
            InputFormat::WeightedEdgeList => Some(parse_weighted_edge_list),
            InputFormat::AdjacencyList => Some(parse_adjacency_list),
        }
    }

    pub fn weight_policy(&self, tolerance: f64) -> WeightPolicy {
        match self {
            InputFormat::WeightedEdgeList | InputFormat::SparseMatrix => WeightPolicy::Weighted,
            InputFormat::EdgeList | InputFormat::AdjacencyList => {
                WeightPolicy::Unweighted { tolerance }
            }
        }
    }
}

fn line_span(tokens: &[Token<'_>]) -> Option<SourceSpan> {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => Some(SourceSpan::new(first.span.start, last.span.end)),
        _ => None,
    }
}

fn field_count_error(tokens: &[Token<'_>], expected: &str) -> XgfsError {
    let err = XgfsError::format(format!(
        "expected {}, found {}",
        expected,
        tokens.len()
    ));
    match line_span(tokens) {
        Some(span) => err.with_span(span),
        None => err,
    }
}

fn parse_weight(token: &Token<'_>) -> Result<f64> {
    token.text.parse::<f64>().map_err(|_| {
        XgfsError::format(format!("invalid weight '{}'", token.text)).with_span(token.span)
    })
}

/// `source target [weight]`. The optional third field is checked later
/// against the unweighted policy.
fn parse_edge_list<'a>(tokens: &[Token<'a>]) -> Result<Record<'a>> {
    match tokens {
        [source, target] => Ok(Record {
            source: *source,
            targets: vec![*target],
            weight: None,
        }),
        [source, target, weight] => Ok(Record {
            source: *source,
            targets: vec![*target],
            weight: Some(parse_weight(weight)?),
        }),
        _ => Err(field_count_error(tokens, "2 values per edge list line")),
    }
}

fn parse_weighted_edge_list<'a>(tokens: &[Token<'a>]) -> Result<Record<'a>> {
    match tokens {
        [source, target, weight] => Ok(Record {
            source: *source,
            targets: vec![*target],
            weight: Some(parse_weight(weight)?),
        }),
        _ => Err(field_count_error(
            tokens,
            "3 values per weighted edge list line",
        )),
    }
}

fn parse_adjacency_list<'a>(tokens: &[Token<'a>]) -> Result<Record<'a>> {
    match tokens {
        [source, targets @ ..] => Ok(Record {
            source: *source,
            targets: targets.to_vec(),
            weight: None,
        }),
        [] => Err(XgfsError::format(
            "adjacency list line has no source node",
        )),
    }
}
