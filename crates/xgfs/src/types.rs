use serde::Serialize;

pub type NodeId = u32;

/// Node and edge counts are bounded by the artifact's 32-bit offset and id fields.
pub const MAX_NODES: usize = i32::MAX as usize;
pub const MAX_EDGES: usize = i32::MAX as usize;

/// Source format of a conversion, selected once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InputFormat {
    #[serde(rename = "mat")]
    SparseMatrix,
    #[serde(rename = "edgelist")]
    EdgeList,
    #[serde(rename = "weighted_edgelist")]
    WeightedEdgeList,
    #[serde(rename = "adjlist")]
    AdjacencyList,
}

impl InputFormat {
    pub const ALL: [InputFormat; 4] = [
        InputFormat::SparseMatrix,
        InputFormat::EdgeList,
        InputFormat::WeightedEdgeList,
        InputFormat::AdjacencyList,
    ];

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "mat" => Some(Self::SparseMatrix),
            "edgelist" => Some(Self::EdgeList),
            "weighted_edgelist" => Some(Self::WeightedEdgeList),
            "adjlist" => Some(Self::AdjacencyList),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SparseMatrix => "mat",
            Self::EdgeList => "edgelist",
            Self::WeightedEdgeList => "weighted_edgelist",
            Self::AdjacencyList => "adjlist",
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, Self::SparseMatrix)
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_name(s).ok_or_else(|| {
            let names: Vec<&str> = Self::ALL.iter().map(|f| f.name()).collect();
            format!("unknown format '{}', expected one of: {}", s, names.join(", "))
        })
    }
}
