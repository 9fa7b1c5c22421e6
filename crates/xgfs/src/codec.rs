//! `XGFS` binary container.
//!
//! Layout, all little-endian:
//!
//! ```text
//! magic        4 bytes   "XGFS"
//! node_count   i64       N
//! edge_count   i64       E
//! offsets      N x i32
//! neighbors    E x i32
//! weights      E x f32   omitted when every weight is 1
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::error::{Result, XgfsError};
use crate::graph::CsrGraph;
use crate::types::{MAX_EDGES, MAX_NODES, NodeId};

pub const MAGIC: &[u8; 4] = b"XGFS";
pub const HEADER_LEN: usize = 20;

/// Size in bytes of the encoded artifact.
pub fn encoded_len(graph: &CsrGraph) -> usize {
    let n = graph.node_count();
    let e = graph.edge_count();
    let weights = if graph.has_unit_weights() { 0 } else { 4 * e };
    HEADER_LEN + 4 * n + 4 * e + weights
}

pub fn encode<W: Write>(graph: &CsrGraph, mut writer: W) -> Result<()> {
    let n = graph.node_count();
    let e = graph.edge_count();
    if n > MAX_NODES || e > MAX_EDGES {
        return Err(XgfsError::Limit(format!(
            "graph with {} nodes and {} edges does not fit 32-bit fields",
            n, e
        )));
    }

    writer.write_all(MAGIC)?;
    writer.write_i64::<LittleEndian>(n as i64)?;
    writer.write_i64::<LittleEndian>(e as i64)?;
    for &offset in graph.offsets() {
        writer.write_i32::<LittleEndian>(offset as i32)?;
    }
    for &target in graph.neighbor_ids() {
        writer.write_i32::<LittleEndian>(target as i32)?;
    }
    let weighted = !graph.has_unit_weights();
    if weighted {
        for &w in graph.weights() {
            writer.write_f32::<LittleEndian>(w)?;
        }
    }
    writer.flush()?;
    debug!(nodes = n, edges = e, weighted, "graph encoded");
    Ok(())
}

fn read_count<R: Read>(reader: &mut R, what: &str, limit: usize) -> Result<usize> {
    let value = reader.read_i64::<LittleEndian>()?;
    if value < 0 || value as u64 > limit as u64 {
        return Err(XgfsError::Codec(format!(
            "{} {} is outside 0..={}",
            what, value, limit
        )));
    }
    Ok(value as usize)
}

/// Entries read per chunk. The output only grows as data actually arrives, so
/// a header claiming huge counts cannot force a large allocation.
const READ_CHUNK: usize = 1 << 16;

fn read_indices<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(len.min(READ_CHUNK));
    let mut chunk = vec![0i32; len.min(READ_CHUNK)];
    let mut remaining = len;
    while remaining > 0 {
        let take = remaining.min(READ_CHUNK);
        reader.read_i32_into::<LittleEndian>(&mut chunk[..take])?;
        for &v in &chunk[..take] {
            let v = u32::try_from(v)
                .map_err(|_| XgfsError::Codec(format!("negative {} entry {}", what, v)))?;
            out.push(v);
        }
        remaining -= take;
    }
    Ok(out)
}

/// Decode an artifact. A missing weight segment decodes as all ones.
pub fn decode<R: Read>(mut reader: R) -> Result<CsrGraph> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(XgfsError::Codec(format!(
            "bad magic {:?}, expected {:?}",
            String::from_utf8_lossy(&magic),
            String::from_utf8_lossy(MAGIC)
        )));
    }
    let n = read_count(&mut reader, "node count", MAX_NODES)?;
    let e = read_count(&mut reader, "edge count", MAX_EDGES)?;

    let offsets = read_indices(&mut reader, n, "offset")?;
    let neighbors: Vec<NodeId> = read_indices(&mut reader, e, "neighbor")?;

    let mut tail = Vec::new();
    reader.read_to_end(&mut tail)?;
    let weights = match tail.len() {
        0 => None,
        len if len == 4 * e => {
            let mut weights = vec![0f32; e];
            (&tail[..]).read_f32_into::<LittleEndian>(&mut weights)?;
            Some(weights)
        }
        len => {
            return Err(XgfsError::Codec(format!(
                "{} trailing bytes; expected 0 or {} for the weight segment",
                len,
                4 * e
            )));
        }
    };

    CsrGraph::from_parts(offsets, neighbors, weights)
}

/// Temporary sibling path used while an artifact is being written.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write atomically: write .tmp → fsync → rename. On failure no file is left
/// at `path`.
pub(crate) fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp_path = staging_path(path);
    let result = (|| -> Result<()> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| XgfsError::Io(e.into_error()))?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

pub fn write_file(graph: &CsrGraph, path: &Path) -> Result<()> {
    write_atomic(path, |writer| encode(graph, writer))
}

pub fn read_file(path: &Path) -> Result<CsrGraph> {
    let file = File::open(path)?;
    decode(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::graph::{AdjacencySet, assemble};

    fn graph(rows: &[&[(NodeId, f32)]]) -> CsrGraph {
        let adjacency: Vec<AdjacencySet> = rows
            .iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        assemble(adjacency).unwrap()
    }

    fn encode_to_vec(g: &CsrGraph) -> Vec<u8> {
        let mut out = Vec::new();
        encode(g, &mut out).unwrap();
        out
    }

    #[test]
    fn test_unweighted_layout() {
        let g = graph(&[&[(1, 1.0)], &[(0, 1.0)]]);
        let bytes = encode_to_vec(&g);

        let mut expected = b"XGFS".to_vec();
        expected.extend_from_slice(&2i64.to_le_bytes());
        expected.extend_from_slice(&2i64.to_le_bytes());
        for v in [0i32, 1, 1, 0] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(bytes, expected);
        assert_eq!(bytes.len(), encoded_len(&g));
    }

    #[test]
    fn test_weighted_layout_appends_weights() {
        let g = graph(&[&[(1, 0.5)], &[]]);
        let bytes = encode_to_vec(&g);
        assert_eq!(bytes.len(), HEADER_LEN + 8 + 4 + 4);
        assert_eq!(&bytes[bytes.len() - 4..], &0.5f32.to_le_bytes());
        assert_eq!(bytes.len(), encoded_len(&g));
    }

    #[test]
    fn test_roundtrip_weighted() {
        let g = graph(&[&[(1, 0.25), (2, 3.0)], &[(2, 1.0)], &[(0, 7.5)]]);
        let decoded = decode(&encode_to_vec(&g)[..]).unwrap();
        assert_eq!(decoded, g);
    }

    #[test]
    fn test_missing_weights_decode_as_ones() {
        let g = graph(&[&[(1, 1.0), (2, 1.0)], &[], &[(1, 1.0)]]);
        let decoded = decode(&encode_to_vec(&g)[..]).unwrap();
        assert_eq!(decoded.weights(), &[1.0, 1.0, 1.0]);
        assert_eq!(decoded.offsets(), g.offsets());
        assert_eq!(decoded.neighbor_ids(), g.neighbor_ids());
    }

    #[test]
    fn test_empty_graph_roundtrip() {
        let g = CsrGraph::empty();
        let bytes = encode_to_vec(&g);
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(decode(&bytes[..]).unwrap(), g);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode_to_vec(&graph(&[&[]]));
        bytes[0] = b'Y';
        assert!(matches!(decode(&bytes[..]), Err(XgfsError::Codec(_))));
    }

    #[test]
    fn test_truncated_artifact_is_an_io_error() {
        let bytes = encode_to_vec(&graph(&[&[(1, 1.0)], &[]]));
        let err = decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, XgfsError::Io(_)), "{}", err);
    }

    #[test]
    fn test_partial_weight_segment_is_rejected() {
        let mut bytes = encode_to_vec(&graph(&[&[(1, 1.0)], &[]]));
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(decode(&bytes[..]), Err(XgfsError::Codec(_))));
    }

    #[test]
    fn test_oversized_counts_fail_on_missing_data() {
        let mut bytes = b"XGFS".to_vec();
        bytes.extend_from_slice(&(i32::MAX as i64).to_le_bytes());
        bytes.extend_from_slice(&(i32::MAX as i64).to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        let err = decode(&bytes[..]).unwrap_err();
        assert!(matches!(err, XgfsError::Io(_)), "{}", err);
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        let n = READ_CHUNK + 3;
        let adjacency: Vec<AdjacencySet> = (0..n as NodeId)
            .map(|i| [((i + 1) % n as NodeId, 1.0)].into_iter().collect())
            .collect();
        let g = assemble(adjacency).unwrap();
        assert_eq!(decode(&encode_to_vec(&g)[..]).unwrap(), g);
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut bytes = b"XGFS".to_vec();
        bytes.extend_from_slice(&(-1i64).to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        assert!(matches!(decode(&bytes[..]), Err(XgfsError::Codec(_))));
    }

    #[test]
    fn test_atomic_write_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.xgfs");
        let g = graph(&[&[(1, 2.0)], &[(0, 2.0)]]);

        write_file(&g, &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("graph.xgfs.tmp").exists());
        assert_eq!(read_file(&path).unwrap(), g);
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("graph.xgfs");
        assert!(write_file(&graph(&[&[]]), &path).is_err());
        assert!(!path.exists());
    }
}
