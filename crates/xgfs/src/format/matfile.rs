//! MATLAB Level 5 MAT-file reader, limited to what a graph needs: locating a
//! named sparse matrix and turning it into CSR.
//!
//! A Level 5 file is a 128-byte header followed by tagged data elements. Each
//! element is either a plain `(type, length)` tag plus data padded to 8 bytes,
//! a "small" element packing type, length and up to 4 data bytes into 8 bytes,
//! or a zlib-compressed element wrapping another element.

use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use tracing::{debug, info};

use crate::error::{Result, XgfsError};
use crate::graph::{CsrGraph, WeightPolicy};
use crate::types::{MAX_EDGES, MAX_NODES, NodeId};

const HEADER_LEN: usize = 128;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;

const MX_SPARSE_CLASS: u32 = 5;
const FLAG_COMPLEX: u32 = 0x0800;
const FLAG_LOGICAL: u32 = 0x0200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

macro_rules! endian_reads {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        impl Endian {
            $(
                fn $name(self, buf: &[u8]) -> $ty {
                    match self {
                        Endian::Little => LittleEndian::$name(buf),
                        Endian::Big => BigEndian::$name(buf),
                    }
                }
            )*
        }
    };
}

endian_reads! {
    read_u16 -> u16,
    read_i16 -> i16,
    read_u32 -> u32,
    read_i32 -> i32,
    read_u64 -> u64,
    read_i64 -> i64,
    read_f32 -> f32,
    read_f64 -> f64,
}

#[derive(Debug)]
struct Element<'a> {
    kind: u32,
    data: &'a [u8],
}

/// Sparse matrix in compressed-sparse-column form, as MATLAB stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    size: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Number of rows, equal to the number of columns.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn nnz(&self) -> usize {
        self.col_ptr.last().copied().unwrap_or(0)
    }

    /// Row-major (CSR) view: row `r` lists the columns of its nonzeros in
    /// ascending order, with the stored values as weights.
    pub fn to_csr(&self) -> Result<CsrGraph> {
        let n = self.size;
        let nnz = self.nnz();
        if n > MAX_NODES || nnz > MAX_EDGES {
            return Err(XgfsError::Limit(format!(
                "sparse matrix {}x{} with {} nonzeros exceeds the artifact limits",
                n, n, nnz
            )));
        }

        let mut counts = vec![0usize; n];
        for &row in &self.row_idx[..nnz] {
            counts[row] += 1;
        }
        let mut offsets = Vec::with_capacity(n);
        let mut next = Vec::with_capacity(n);
        let mut running = 0usize;
        for count in counts {
            offsets.push(running as u32);
            next.push(running);
            running += count;
        }

        let mut neighbors: Vec<NodeId> = vec![0; nnz];
        let mut weights = vec![0.0f32; nnz];
        for col in 0..n {
            for k in self.col_ptr[col]..self.col_ptr[col + 1] {
                let row = self.row_idx[k];
                let value = self.values[k];
                let weight = WeightPolicy::Weighted.resolve(Some(value)).map_err(|_| {
                    XgfsError::weight(format!(
                        "entry ({}, {}) holds {}; weights must be finite and positive",
                        row, col, value
                    ))
                })?;
                let slot = next[row];
                neighbors[slot] = col as NodeId;
                weights[slot] = weight;
                next[row] += 1;
            }
        }

        CsrGraph::from_parts(offsets, neighbors, Some(weights)).map_err(|e| match e {
            XgfsError::Codec(msg) => XgfsError::format(format!("malformed sparse matrix: {}", msg)),
            other => other,
        })
    }
}

/// Load the sparse matrix stored under `variable` in a MAT-file.
pub fn read_sparse_matrix(path: &Path, variable: &str) -> Result<SparseMatrix> {
    let bytes = std::fs::read(path)?;
    let matrix = parse_sparse_matrix(&bytes, variable)?;
    info!(
        path = %path.display(),
        variable,
        size = matrix.size(),
        nnz = matrix.nnz(),
        "sparse matrix loaded"
    );
    Ok(matrix)
}

pub fn parse_sparse_matrix(bytes: &[u8], variable: &str) -> Result<SparseMatrix> {
    let endian = parse_header(bytes)?;
    let mut names = Vec::new();
    let mut pos = HEADER_LEN;
    while let Some(element) = next_element(bytes, &mut pos, endian)? {
        let lookup = match element.kind {
            MI_COMPRESSED => {
                let inflated = inflate(element.data)?;
                let mut inner_pos = 0;
                match next_element(&inflated, &mut inner_pos, endian)? {
                    Some(inner) if inner.kind == MI_MATRIX => {
                        parse_matrix(inner.data, endian, variable)?
                    }
                    _ => continue,
                }
            }
            MI_MATRIX => parse_matrix(element.data, endian, variable)?,
            other => {
                debug!(kind = other, "skipping top-level element");
                continue;
            }
        };
        match lookup {
            Lookup::Found(matrix) => return Ok(matrix),
            Lookup::Other(name) => names.push(name),
        }
    }
    Err(XgfsError::format(format!(
        "variable '{}' not found in MAT-file (available: {})",
        variable,
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    )))
}

fn parse_header(bytes: &[u8]) -> Result<Endian> {
    if bytes.len() < HEADER_LEN {
        return Err(XgfsError::format(
            "file is too short for a MAT-file header",
        ));
    }
    let endian = match &bytes[126..128] {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        _ => {
            return Err(XgfsError::format(
                "not a Level 5 MAT-file (MAT v4 files are not supported)",
            ));
        }
    };
    match endian.read_u16(&bytes[124..126]) {
        0x0100 => Ok(endian),
        0x0200 => Err(XgfsError::format(
            "MAT v7.3 (HDF5) files are not supported; save with -v7",
        )),
        other => Err(XgfsError::format(format!(
            "unsupported MAT-file version 0x{:04x}",
            other
        ))),
    }
}

/// Read the element at `pos` and advance past it, padding included.
fn next_element<'a>(buf: &'a [u8], pos: &mut usize, endian: Endian) -> Result<Option<Element<'a>>> {
    if *pos >= buf.len() {
        return Ok(None);
    }
    let at = *pos;
    let truncated = || XgfsError::format(format!("truncated data element at byte {}", at));
    if buf.len() - *pos < 8 {
        return Err(truncated());
    }

    let first = endian.read_u32(&buf[*pos..*pos + 4]);
    let small_len = (first >> 16) as usize;
    if small_len != 0 {
        if small_len > 4 {
            return Err(XgfsError::format(format!(
                "small data element at byte {} claims {} bytes",
                *pos, small_len
            )));
        }
        let data = &buf[*pos + 4..*pos + 4 + small_len];
        *pos += 8;
        return Ok(Some(Element {
            kind: first & 0xFFFF,
            data,
        }));
    }

    let kind = first;
    let len = endian.read_u32(&buf[*pos + 4..*pos + 8]) as usize;
    let start = *pos + 8;
    let end = start.checked_add(len).filter(|&end| end <= buf.len());
    let Some(end) = end else {
        return Err(truncated());
    };
    let padded = if kind == MI_COMPRESSED {
        len
    } else {
        len.div_ceil(8) * 8
    };
    *pos = (start + padded).min(buf.len());
    Ok(Some(Element {
        kind,
        data: &buf[start..end],
    }))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| XgfsError::format(format!("corrupt compressed element: {}", e)))?;
    Ok(out)
}

enum Lookup {
    Found(SparseMatrix),
    Other(String),
}

fn required<'a>(
    buf: &'a [u8],
    pos: &mut usize,
    endian: Endian,
    what: &str,
) -> Result<Element<'a>> {
    next_element(buf, pos, endian)?
        .ok_or_else(|| XgfsError::format(format!("matrix element is missing its {}", what)))
}

fn parse_matrix(data: &[u8], endian: Endian, wanted: &str) -> Result<Lookup> {
    let mut pos = 0;

    let flags_el = required(data, &mut pos, endian, "array flags")?;
    if flags_el.kind != MI_UINT32 || flags_el.data.len() < 8 {
        return Err(XgfsError::format("malformed array flags"));
    }
    let flags = endian.read_u32(&flags_el.data[0..4]);
    let class = flags & 0xFF;

    let dims_el = required(data, &mut pos, endian, "dimensions")?;
    let dims = index_values(&dims_el, endian, "dimensions")?;

    let name_el = required(data, &mut pos, endian, "name")?;
    let name = String::from_utf8_lossy(name_el.data).into_owned();
    if name != wanted {
        return Ok(Lookup::Other(name));
    }

    if class != MX_SPARSE_CLASS {
        return Err(XgfsError::format(format!(
            "variable '{}' is not a sparse matrix (array class {})",
            name, class
        )));
    }
    if flags & FLAG_COMPLEX != 0 {
        return Err(XgfsError::format(format!(
            "variable '{}' is complex; only real sparse matrices are supported",
            name
        )));
    }
    let size = match dims.as_slice() {
        [rows, cols] if rows == cols => *rows,
        [rows, cols] => {
            return Err(XgfsError::format(format!(
                "adjacency matrix '{}' must be square, found {}x{}",
                name, rows, cols
            )));
        }
        other => {
            return Err(XgfsError::format(format!(
                "adjacency matrix '{}' must be 2-dimensional, found {} dimensions",
                name,
                other.len()
            )));
        }
    };

    let ir_el = required(data, &mut pos, endian, "row indices")?;
    let row_idx = index_values(&ir_el, endian, "row indices")?;
    let jc_el = required(data, &mut pos, endian, "column pointers")?;
    let col_ptr = index_values(&jc_el, endian, "column pointers")?;

    if col_ptr.len() != size + 1 || col_ptr.first() != Some(&0) {
        return Err(XgfsError::format(format!(
            "column pointers of '{}' have length {}, expected {} starting at 0",
            name,
            col_ptr.len(),
            size + 1
        )));
    }
    if col_ptr.windows(2).any(|w| w[0] > w[1]) {
        return Err(XgfsError::format(format!(
            "column pointers of '{}' are not monotone",
            name
        )));
    }
    let nnz = col_ptr[size];
    if row_idx.len() < nnz {
        return Err(XgfsError::format(format!(
            "'{}' has {} nonzeros but only {} row indices",
            name,
            nnz,
            row_idx.len()
        )));
    }
    if let Some(bad) = row_idx[..nnz].iter().find(|&&r| r >= size) {
        return Err(XgfsError::format(format!(
            "row index {} of '{}' is outside 0..{}",
            bad, name, size
        )));
    }

    let values = if flags & FLAG_LOGICAL != 0 {
        vec![1.0; nnz]
    } else {
        let pr_el = required(data, &mut pos, endian, "values")?;
        let values = numeric_values(&pr_el, endian)?;
        if values.len() < nnz {
            return Err(XgfsError::format(format!(
                "'{}' has {} nonzeros but only {} values",
                name,
                nnz,
                values.len()
            )));
        }
        values
    };

    debug!(variable = %name, size, nnz, "sparse matrix decoded");
    Ok(Lookup::Found(SparseMatrix {
        size,
        col_ptr,
        row_idx: row_idx[..nnz].to_vec(),
        values: values[..nnz].to_vec(),
    }))
}

fn chunks(data: &[u8], width: usize) -> Result<std::slice::ChunksExact<'_, u8>> {
    if data.len() % width != 0 {
        return Err(XgfsError::format(format!(
            "numeric data of {} bytes is not a multiple of {}",
            data.len(),
            width
        )));
    }
    Ok(data.chunks_exact(width))
}

/// Decode any numeric storage class to `f64`. MATLAB may store values in a
/// narrower type than the array class when they fit.
fn numeric_values(element: &Element<'_>, endian: Endian) -> Result<Vec<f64>> {
    let data = element.data;
    let values: Vec<f64> = match element.kind {
        MI_INT8 => data.iter().map(|&b| b as i8 as f64).collect(),
        MI_UINT8 | MI_UTF8 => data.iter().map(|&b| b as f64).collect(),
        MI_INT16 => chunks(data, 2)?.map(|b| endian.read_i16(b) as f64).collect(),
        MI_UINT16 => chunks(data, 2)?.map(|b| endian.read_u16(b) as f64).collect(),
        MI_INT32 => chunks(data, 4)?.map(|b| endian.read_i32(b) as f64).collect(),
        MI_UINT32 => chunks(data, 4)?.map(|b| endian.read_u32(b) as f64).collect(),
        MI_SINGLE => chunks(data, 4)?.map(|b| endian.read_f32(b) as f64).collect(),
        MI_DOUBLE => chunks(data, 8)?.map(|b| endian.read_f64(b)).collect(),
        MI_INT64 => chunks(data, 8)?.map(|b| endian.read_i64(b) as f64).collect(),
        MI_UINT64 => chunks(data, 8)?.map(|b| endian.read_u64(b) as f64).collect(),
        other => {
            return Err(XgfsError::format(format!(
                "unsupported numeric data type {}",
                other
            )));
        }
    };
    Ok(values)
}

fn index_values(element: &Element<'_>, endian: Endian, what: &str) -> Result<Vec<usize>> {
    numeric_values(element, endian)?
        .into_iter()
        .map(|v| {
            if v.fract() == 0.0 && v >= 0.0 && v <= MAX_EDGES as f64 {
                Ok(v as usize)
            } else {
                Err(XgfsError::format(format!("invalid {} entry {}", what, v)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    use super::*;

    fn header() -> Vec<u8> {
        let mut out = format!("{:<116}", "MATLAB 5.0 MAT-file, written by tests").into_bytes();
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&0x0100u16.to_le_bytes());
        out.extend_from_slice(b"IM");
        out
    }

    fn element(kind: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        while out.len() % 8 != 0 {
            out.push(0);
        }
        out
    }

    fn small_element(kind: u32, data: &[u8]) -> Vec<u8> {
        assert!(data.len() <= 4);
        let mut out = ((data.len() as u32) << 16 | kind).to_le_bytes().to_vec();
        out.extend_from_slice(data);
        out.resize(8, 0);
        out
    }

    fn i32s(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn f64s(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn sparse(name: &str, n: i32, ir: &[i32], jc: &[i32], pr: &[f64], flags: u32) -> Vec<u8> {
        let mut body = element(MI_UINT32, &[(MX_SPARSE_CLASS | flags).to_le_bytes(), (ir.len() as u32).to_le_bytes()].concat());
        body.extend(element(MI_INT32, &i32s(&[n, n])));
        if name.len() <= 4 {
            body.extend(small_element(MI_INT8, name.as_bytes()));
        } else {
            body.extend(element(MI_INT8, name.as_bytes()));
        }
        body.extend(element(MI_INT32, &i32s(ir)));
        body.extend(element(MI_INT32, &i32s(jc)));
        if flags & FLAG_LOGICAL != 0 {
            body.extend(element(MI_UINT8, &vec![1u8; pr.len()]));
        } else {
            body.extend(element(MI_DOUBLE, &f64s(pr)));
        }
        element(MI_MATRIX, &body)
    }

    fn compressed(inner: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(inner).unwrap();
        let data = enc.finish().unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out
    }

    // [[0 1 0]
    //  [2 0 3]
    //  [0 0 0]]  stored column-major
    fn sample(name: &str) -> Vec<u8> {
        sparse(name, 3, &[1, 0, 1], &[0, 1, 2, 3], &[2.0, 1.0, 3.0], 0)
    }

    #[test]
    fn csc_is_transposed_into_rows() {
        let mut file = header();
        file.extend(sample("network"));
        let matrix = parse_sparse_matrix(&file, "network").unwrap();
        assert_eq!(matrix.size(), 3);
        assert_eq!(matrix.nnz(), 3);

        let csr = matrix.to_csr().unwrap();
        assert_eq!(csr.offsets(), &[0, 1, 3]);
        assert_eq!(csr.neighbors(0), &[1]);
        assert_eq!(csr.neighbors(1), &[0, 2]);
        assert_eq!(csr.edge_weights(1), &[2.0, 3.0]);
        assert_eq!(csr.degree(2), 0);
    }

    #[test]
    fn compressed_elements_are_inflated() {
        let mut file = header();
        file.extend(compressed(&sample("other_var")));
        file.extend(compressed(&sample("adj")));
        let matrix = parse_sparse_matrix(&file, "adj").unwrap();
        assert_eq!(matrix.nnz(), 3);
    }

    #[test]
    fn logical_matrices_have_unit_weights() {
        let mut file = header();
        file.extend(sparse("g", 2, &[1, 0], &[0, 1, 2], &[1.0, 1.0], FLAG_LOGICAL));
        let csr = parse_sparse_matrix(&file, "g").unwrap().to_csr().unwrap();
        assert!(csr.has_unit_weights());
        assert_eq!(csr.neighbors(0), &[1]);
        assert_eq!(csr.neighbors(1), &[0]);
    }

    #[test]
    fn missing_variable_lists_available_names() {
        let mut file = header();
        file.extend(sample("network"));
        let err = parse_sparse_matrix(&file, "graph").unwrap_err();
        assert!(err.to_string().contains("network"), "{}", err);
    }

    #[test]
    fn non_square_matrix_is_rejected() {
        let mut body = element(MI_UINT32, &[MX_SPARSE_CLASS.to_le_bytes(), 0u32.to_le_bytes()].concat());
        body.extend(element(MI_INT32, &i32s(&[2, 3])));
        body.extend(small_element(MI_INT8, b"m"));
        let mut file = header();
        file.extend(element(MI_MATRIX, &body));
        let err = parse_sparse_matrix(&file, "m").unwrap_err();
        assert!(err.to_string().contains("square"), "{}", err);
    }

    #[test]
    fn dense_variable_is_rejected() {
        let mut body = element(MI_UINT32, &[6u32.to_le_bytes(), 0u32.to_le_bytes()].concat());
        body.extend(element(MI_INT32, &i32s(&[1, 1])));
        body.extend(small_element(MI_INT8, b"d"));
        body.extend(element(MI_DOUBLE, &f64s(&[1.0])));
        let mut file = header();
        file.extend(element(MI_MATRIX, &body));
        let err = parse_sparse_matrix(&file, "d").unwrap_err();
        assert!(err.to_string().contains("not a sparse matrix"), "{}", err);
    }

    #[test]
    fn nonpositive_entries_violate_weight_policy() {
        let mut file = header();
        file.extend(sparse("w", 2, &[1], &[0, 1, 1], &[-1.0], 0));
        let err = parse_sparse_matrix(&file, "w").unwrap().to_csr().unwrap_err();
        assert!(matches!(err, XgfsError::WeightPolicy(_)), "{}", err);
    }

    #[test]
    fn hdf5_version_is_rejected() {
        let mut file = header();
        file[124..126].copy_from_slice(&0x0200u16.to_le_bytes());
        let err = parse_sparse_matrix(&file, "network").unwrap_err();
        assert!(err.to_string().contains("v7.3"), "{}", err);
    }

    #[test]
    fn short_file_is_rejected() {
        let err = parse_sparse_matrix(b"MATLAB", "network").unwrap_err();
        assert!(matches!(err, XgfsError::Format(_)));
    }

    #[test]
    fn big_endian_files_are_read() {
        let mut file = format!("{:<116}", "MATLAB 5.0 MAT-file").into_bytes();
        file.extend_from_slice(&[0u8; 8]);
        file.extend_from_slice(&0x0100u16.to_be_bytes());
        file.extend_from_slice(b"MI");

        let be_el = |kind: u32, data: &[u8]| {
            let mut out = kind.to_be_bytes().to_vec();
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
            while out.len() % 8 != 0 {
                out.push(0);
            }
            out
        };
        let be_i32 = |v: &[i32]| -> Vec<u8> { v.iter().flat_map(|x| x.to_be_bytes()).collect() };

        let mut body = be_el(MI_UINT32, &[MX_SPARSE_CLASS.to_be_bytes(), 1u32.to_be_bytes()].concat());
        body.extend(be_el(MI_INT32, &be_i32(&[2, 2])));
        body.extend(be_el(MI_INT8, b"net"));
        body.extend(be_el(MI_INT32, &be_i32(&[0])));
        body.extend(be_el(MI_INT32, &be_i32(&[0, 0, 1])));
        body.extend(be_el(MI_DOUBLE, &4.0f64.to_be_bytes()));
        file.extend(be_el(MI_MATRIX, &body));

        let csr = parse_sparse_matrix(&file, "net").unwrap().to_csr().unwrap();
        assert_eq!(csr.neighbors(0), &[1]);
        assert_eq!(csr.edge_weights(0), &[4.0]);
    }
}
