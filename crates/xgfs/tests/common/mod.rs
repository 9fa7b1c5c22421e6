#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const MI_INT8: u32 = 1;
pub const MI_INT32: u32 = 5;
pub const MI_UINT32: u32 = 6;
pub const MI_DOUBLE: u32 = 9;
pub const MI_MATRIX: u32 = 14;
pub const MX_SPARSE_CLASS: u32 = 5;

pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
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

fn i32s(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Little-endian, uncompressed MAT-file holding one real `n x n` sparse
/// matrix built from `(row, col, value)` triplets.
pub fn mat_file(name: &str, n: i32, triplets: &[(i32, i32, f64)]) -> Vec<u8> {
    let mut sorted = triplets.to_vec();
    sorted.sort_by_key(|&(r, c, _)| (c, r));

    let mut jc = vec![0i32; n as usize + 1];
    for &(_, c, _) in &sorted {
        jc[c as usize + 1] += 1;
    }
    for i in 0..n as usize {
        jc[i + 1] += jc[i];
    }
    let ir: Vec<i32> = sorted.iter().map(|&(r, _, _)| r).collect();
    let pr: Vec<u8> = sorted.iter().flat_map(|&(_, _, v)| v.to_le_bytes()).collect();

    let flags = [MX_SPARSE_CLASS.to_le_bytes(), (ir.len() as u32).to_le_bytes()].concat();
    let mut body = element(MI_UINT32, &flags);
    body.extend(element(MI_INT32, &i32s(&[n, n])));
    body.extend(element(MI_INT8, name.as_bytes()));
    body.extend(element(MI_INT32, &i32s(&ir)));
    body.extend(element(MI_INT32, &i32s(&jc)));
    body.extend(element(MI_DOUBLE, &pr));

    let mut out = format!("{:<116}", "MATLAB 5.0 MAT-file").into_bytes();
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");
    out.extend(element(MI_MATRIX, &body));
    out
}
