use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, SourceSpan, XgfsError};
use crate::graph::{CsrGraph, GraphBuilder, LabelScan, NodeIdentity, WeightPolicy};
use crate::types::InputFormat;

use super::{LineParser, Record, Token};

/// Splits a line into tokens, either on a fixed separator or on whitespace runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer<'s> {
    separator: Option<&'s str>,
}

impl<'s> Tokenizer<'s> {
    pub fn new(separator: Option<&'s str>) -> Self {
        Tokenizer { separator }
    }

    /// A blank line yields no tokens. With a separator, fields are trimmed and
    /// an empty field is rejected.
    pub fn tokenize<'a>(&self, line: &'a str) -> Result<Vec<Token<'a>>> {
        if line.trim().is_empty() {
            return Ok(Vec::new());
        }
        match self.separator {
            None => Ok(line
                .split_whitespace()
                .map(|part| Token::within(line, part))
                .collect()),
            Some(sep) => line
                .trim()
                .split(sep)
                .map(|field| {
                    let part = field.trim();
                    let token = Token::within(line, part);
                    if part.is_empty() {
                        let at = Token::within(line, field).span.start;
                        return Err(XgfsError::format(format!(
                            "empty field between '{}' separators",
                            sep
                        ))
                        .with_span(SourceSpan::new(at, at)));
                    }
                    Ok(token)
                })
                .collect(),
        }
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('%')
}

/// Feed every record of `reader` to `visit`. Errors carry the 1-based line
/// number and the raw line text. Returns the number of records visited.
pub(crate) fn for_each_record<R, F>(
    reader: R,
    tokenizer: &Tokenizer<'_>,
    parser: LineParser,
    mut visit: F,
) -> Result<usize>
where
    R: BufRead,
    F: FnMut(&Record<'_>) -> Result<()>,
{
    let mut records = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| {
            if e.kind() == ErrorKind::InvalidData {
                XgfsError::format(format!("line {} is not valid UTF-8", line_no))
            } else {
                XgfsError::Io(e)
            }
        })?;
        if line.is_empty() || is_comment(&line) {
            continue;
        }
        let tokens = tokenizer
            .tokenize(&line)
            .map_err(|e| e.at_line(line_no, &line))?;
        let record = parser(&tokens).map_err(|e| e.at_line(line_no, &line))?;
        visit(&record).map_err(|e| {
            // Record-level failures point at the whole line.
            e.with_span(SourceSpan::new(0, line.len()))
                .at_line(line_no, &line)
        })?;
        records += 1;
    }
    Ok(records)
}

/// Reader for the line-oriented formats. Runs the two-phase protocol: a scan
/// pass locks the id policy, then a build pass fills the adjacency sets.
#[derive(Debug, Clone)]
pub struct TextReader<'s> {
    format: InputFormat,
    parser: LineParser,
    tokenizer: Tokenizer<'s>,
    undirected: bool,
    policy: WeightPolicy,
}

impl<'s> TextReader<'s> {
    pub fn new(
        format: InputFormat,
        separator: Option<&'s str>,
        undirected: bool,
        weight_tolerance: f64,
    ) -> Result<Self> {
        let parser = format.line_parser().ok_or_else(|| {
            XgfsError::InvalidParameter(format!("'{}' is not a line-oriented format", format))
        })?;
        Ok(TextReader {
            format,
            parser,
            tokenizer: Tokenizer::new(separator),
            undirected,
            policy: format.weight_policy(weight_tolerance),
        })
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }

    /// Pass one: validate every line and collect the distinct labels.
    pub fn scan<R: BufRead>(&self, reader: R) -> Result<NodeIdentity> {
        let mut scan = LabelScan::new();
        let records = for_each_record(reader, &self.tokenizer, self.parser, |record| {
            scan.observe(record.source.text);
            for target in &record.targets {
                scan.observe(target.text);
            }
            Ok(())
        })?;
        let identity = scan.finish()?;
        info!(
            format = %self.format,
            records,
            nodes = identity.len(),
            policy = ?identity.policy(),
            "identity scan complete"
        );
        Ok(identity)
    }

    /// Pass two: resolve labels through `identity` and build the CSR graph.
    pub fn build<R: BufRead>(
        &self,
        reader: R,
        identity: NodeIdentity,
    ) -> Result<(CsrGraph, NodeIdentity)> {
        let mut builder = GraphBuilder::new(identity, self.undirected, self.policy);
        let records = for_each_record(reader, &self.tokenizer, self.parser, |record| {
            let targets: Vec<&str> = record.targets.iter().map(|t| t.text).collect();
            builder.add_record(record.source.text, &targets, record.weight)
        })?;
        debug!(records, "adjacency pass complete");
        builder.finish()
    }

    pub fn read<R, F>(&self, mut open: F) -> Result<(CsrGraph, NodeIdentity)>
    where
        R: BufRead,
        F: FnMut() -> Result<R>,
    {
        let identity = self.scan(open()?)?;
        self.build(open()?, identity)
    }

    pub fn read_file(&self, path: &Path) -> Result<(CsrGraph, NodeIdentity)> {
        self.read(|| Ok(BufReader::new(File::open(path)?)))
    }

    pub fn read_str(&self, data: &str) -> Result<(CsrGraph, NodeIdentity)> {
        self.read(|| Ok(data.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(format: InputFormat, undirected: bool) -> TextReader<'static> {
        TextReader::new(format, None, undirected, 1e-4).unwrap()
    }

    fn tokens(sep: Option<&str>, line: &str) -> Vec<String> {
        Tokenizer::new(sep)
            .tokenize(line)
            .unwrap()
            .into_iter()
            .map(|t| t.text.to_string())
            .collect()
    }

    #[test]
    fn whitespace_tokenizer_records_spans() {
        let toks = Tokenizer::new(None).tokenize("  a\tbb  c").unwrap();
        let spans: Vec<_> = toks.iter().map(|t| (t.span.start, t.span.end)).collect();
        assert_eq!(spans, vec![(2, 3), (4, 6), (8, 9)]);
    }

    #[test]
    fn separator_tokenizer_trims_fields() {
        assert_eq!(tokens(Some(","), "1, 2 ,3"), vec!["1", "2", "3"]);
        assert!(tokens(Some(","), "   ").is_empty());
    }

    #[test]
    fn separator_tokenizer_rejects_empty_field() {
        let err = Tokenizer::new(Some(",")).tokenize("1,,2").unwrap_err();
        assert!(matches!(err, XgfsError::Format(_)), "{}", err);
    }

    #[test]
    fn edge_list_end_to_end_undirected() {
        let (graph, identity) = reader(InputFormat::EdgeList, true)
            .read_str("1 2\n2 3\n1 3\n")
            .unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 6);
        assert_eq!(graph.neighbors(0), &[1, 2]);
        assert!(graph.has_unit_weights());
        assert_eq!(identity.labels(), &["1", "2", "3"]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let data = "# header\n% matrix market style\n\n1 2\r\n2 1\n";
        let (graph, _) = reader(InputFormat::EdgeList, false).read_str(data).unwrap();
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn numeric_ids_follow_value_order() {
        let (graph, identity) = reader(InputFormat::EdgeList, false)
            .read_str("10 2\n2 1\n")
            .unwrap();
        assert_eq!(identity.labels(), &["1", "2", "10"]);
        assert_eq!(graph.neighbors(2), &[1]);
        assert_eq!(graph.neighbors(1), &[0]);
    }

    #[test]
    fn string_labels_follow_lexicographic_order() {
        let (graph, identity) = reader(InputFormat::EdgeList, false)
            .read_str("b a\nc 10\n")
            .unwrap();
        assert_eq!(identity.labels(), &["10", "a", "b", "c"]);
        assert_eq!(graph.neighbors(2), &[1]);
        assert_eq!(graph.neighbors(3), &[0]);
    }

    #[test]
    fn weighted_edge_list_keeps_weights() {
        let (graph, _) = reader(InputFormat::WeightedEdgeList, false)
            .read_str("1 2 0.5\n")
            .unwrap();
        assert_eq!(graph.edge_weights(0), &[0.5]);
        assert!(!graph.has_unit_weights());
    }

    #[test]
    fn undirected_reverse_edge_overwrites_both_directions() {
        let (graph, _) = reader(InputFormat::WeightedEdgeList, true)
            .read_str("1 2 0.5\n2 1 0.7\n")
            .unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edge_weights(0), &[0.7]);
        assert_eq!(graph.edge_weights(1), &[0.7]);
    }

    #[test]
    fn plain_edge_list_rejects_weight_field() {
        let err = reader(InputFormat::EdgeList, false)
            .read_str("1 2 0.5\n")
            .unwrap_err();
        match err {
            XgfsError::WeightPolicy(d) => assert_eq!(d.line, Some(1)),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn plain_edge_list_accepts_unit_weight_field() {
        let (graph, _) = reader(InputFormat::EdgeList, false)
            .read_str("1 2 1.0\n")
            .unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn single_token_edge_line_is_a_format_violation() {
        let err = reader(InputFormat::EdgeList, false)
            .read_str("1 2\n3\n")
            .unwrap_err();
        match err {
            XgfsError::Format(d) => {
                assert_eq!(d.line, Some(2));
                assert_eq!(d.text.as_deref(), Some("3"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn weighted_edge_list_requires_three_fields() {
        let err = reader(InputFormat::WeightedEdgeList, false)
            .read_str("1 2\n")
            .unwrap_err();
        assert!(matches!(err, XgfsError::Format(_)), "{}", err);
    }

    #[test]
    fn unparsable_weight_points_at_token() {
        let err = reader(InputFormat::WeightedEdgeList, false)
            .read_str("1 2 heavy\n")
            .unwrap_err();
        let diag = err.diagnostic().unwrap();
        assert_eq!(diag.span, Some(SourceSpan::new(4, 9)));
    }

    #[test]
    fn adjacency_list_builds_stars() {
        let (graph, _) = reader(InputFormat::AdjacencyList, false)
            .read_str("1 2 3 4\n2 3\n4\n")
            .unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.neighbors(0), &[1, 2, 3]);
        assert_eq!(graph.neighbors(1), &[2]);
        assert_eq!(graph.degree(3), 0);
    }

    #[test]
    fn adjacency_list_line_without_tokens_is_rejected() {
        let err = reader(InputFormat::AdjacencyList, false)
            .read_str("1 2\n   \n")
            .unwrap_err();
        match err {
            XgfsError::Format(d) => assert_eq!(d.line, Some(2)),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn custom_separator_allows_spaces_in_labels() {
        let r = TextReader::new(InputFormat::EdgeList, Some(","), false, 1e-4).unwrap();
        let (graph, identity) = r.read_str("new york,boston\nboston,new york\n").unwrap();
        assert_eq!(identity.labels(), &["boston", "new york"]);
        assert_eq!(graph.neighbors(0), &[1]);
        assert_eq!(graph.neighbors(1), &[0]);
    }

    #[test]
    fn sparse_matrix_is_not_a_text_format() {
        let err = TextReader::new(InputFormat::SparseMatrix, None, false, 1e-4).unwrap_err();
        assert!(matches!(err, XgfsError::InvalidParameter(_)));
    }
}
