use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;

use ahash::AHashMap;
use serde::Serialize;

use crate::error::{Result, XgfsError};
use crate::types::{MAX_NODES, NodeId};

/// Ordering used to hand out node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdPolicy {
    /// Every label parsed as an integer; ids follow ascending numeric value.
    Numeric,
    /// At least one label was not an integer; ids follow ascending string order.
    Lexicographic,
}

/// First pass over an input: collects distinct labels before any id exists.
#[derive(Debug, Default)]
pub struct LabelScan {
    labels: BTreeSet<String>,
}

impl LabelScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, label: &str) {
        if !self.labels.contains(label) {
            self.labels.insert(label.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Lock the id policy and assign ids.
    pub fn finish(self) -> Result<NodeIdentity> {
        NodeIdentity::from_distinct(self.labels)
    }
}

#[derive(Debug, Clone)]
enum LabelIndex {
    Numeric(AHashMap<NumericLabel, NodeId>),
    Lexicographic(AHashMap<String, NodeId>),
}

/// Dense label -> id mapping, fixed once built.
///
/// `labels()[id]` is the canonical label of `id`; for numeric ids that is the
/// decimal rendering of the parsed value.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    index: LabelIndex,
    labels: Vec<String>,
}

impl NodeIdentity {
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_distinct(labels.into_iter().map(Into::into).collect())
    }

    fn from_distinct(distinct: BTreeSet<String>) -> Result<Self> {
        let numeric: Option<BTreeSet<NumericLabel>> =
            distinct.iter().map(|l| parse_numeric_label(l)).collect();

        let identity = match numeric {
            Some(values) => {
                check_node_limit(values.len())?;
                let labels: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                let index = values
                    .into_iter()
                    .enumerate()
                    .map(|(id, v)| (v, id as NodeId))
                    .collect();
                NodeIdentity {
                    index: LabelIndex::Numeric(index),
                    labels,
                }
            }
            None => {
                check_node_limit(distinct.len())?;
                let labels: Vec<String> = distinct.into_iter().collect();
                let index = labels
                    .iter()
                    .enumerate()
                    .map(|(id, l)| (l.clone(), id as NodeId))
                    .collect();
                NodeIdentity {
                    index: LabelIndex::Lexicographic(index),
                    labels,
                }
            }
        };
        Ok(identity)
    }

    pub fn policy(&self) -> IdPolicy {
        match self.index {
            LabelIndex::Numeric(_) => IdPolicy::Numeric,
            LabelIndex::Lexicographic(_) => IdPolicy::Lexicographic,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    pub fn resolve(&self, label: &str) -> Result<NodeId> {
        let found = match &self.index {
            LabelIndex::Numeric(index) => {
                let value = parse_numeric_label(label).ok_or_else(|| {
                    XgfsError::identity(format!(
                        "label '{}' is not an integer but node ids are locked to numeric order",
                        label
                    ))
                })?;
                index.get(&value).copied()
            }
            LabelIndex::Lexicographic(index) => index.get(label).copied(),
        };
        found.ok_or_else(|| {
            XgfsError::identity(format!("label '{}' was not seen by the identity scan", label))
        })
    }

    /// Write the `row,label` index read back by [`crate::embedding::Embedding`].
    pub fn write_index<W: Write>(&self, mut writer: W) -> Result<()> {
        for (id, label) in self.labels.iter().enumerate() {
            writeln!(writer, "{},{}", id, label)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Integer value of a label, of any magnitude. Kept as sign plus decimal
/// digits with leading zeros stripped, so equal values compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NumericLabel {
    negative: bool,
    digits: String,
}

impl Ord for NumericLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        let magnitude = || {
            self.digits
                .len()
                .cmp(&other.digits.len())
                .then_with(|| self.digits.cmp(&other.digits))
        };
        match (self.negative, other.negative) {
            (false, false) => magnitude(),
            (true, true) => magnitude().reverse(),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl PartialOrd for NumericLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NumericLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.digits)
        } else {
            write!(f, "{}", self.digits)
        }
    }
}

/// Integer label parse. Surrounding whitespace and a leading sign are accepted,
/// so `"01"` and `"+1"` name the same node as `"1"`. There is no range limit.
pub(crate) fn parse_numeric_label(label: &str) -> Option<NumericLabel> {
    let label = label.trim();
    let (negative, rest) = match label.as_bytes().first()? {
        b'-' => (true, &label[1..]),
        b'+' => (false, &label[1..]),
        _ => (false, label),
    };
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = match rest.trim_start_matches('0') {
        "" => "0",
        digits => digits,
    };
    Some(NumericLabel {
        negative: negative && digits != "0",
        digits: digits.to_string(),
    })
}

fn check_node_limit(count: usize) -> Result<()> {
    if count > MAX_NODES {
        return Err(XgfsError::Limit(format!(
            "{} distinct nodes exceed the artifact limit of {}",
            count, MAX_NODES
        )));
    }
    Ok(())
}
