//! On-disk adjacency matrix: `LRM1`, `N` rows, `N` cols, nnz, then the row,
//! col (`u32`) and count (`u64`) columns, then a CRC32 trailer.

use std::fs;
use std::path::Path;

use crate::errors::{LinkRankError, LinkRankResult};
use crate::graph::sparse::AdjacencyMatrix;
use crate::store::binio::{seal, unseal, ByteCursor};

const MATRIX_MAGIC: &[u8; 4] = b"LRM1";

pub fn encode_adjacency(matrix: &AdjacencyMatrix) -> Vec<u8> {
    let nnz = matrix.nnz();
    let mut buf = Vec::with_capacity(4 + 24 + nnz * 16 + 4);
    buf.extend_from_slice(MATRIX_MAGIC);
    let (rows, cols) = matrix.shape();
    buf.extend_from_slice(&(rows as u64).to_le_bytes());
    buf.extend_from_slice(&(cols as u64).to_le_bytes());
    buf.extend_from_slice(&(nnz as u64).to_le_bytes());
    for r in matrix.rows() {
        buf.extend_from_slice(&r.to_le_bytes());
    }
    for c in matrix.cols() {
        buf.extend_from_slice(&c.to_le_bytes());
    }
    for n in matrix.counts() {
        buf.extend_from_slice(&n.to_le_bytes());
    }
    seal(&mut buf);
    buf
}

pub fn decode_adjacency(bytes: &[u8]) -> LinkRankResult<AdjacencyMatrix> {
    let what = "adjacency matrix";
    let (body, _) = unseal(bytes, MATRIX_MAGIC, what)?;
    let mut cursor = ByteCursor::new(body, what);
    let rows = cursor.len()?;
    let cols = cursor.len()?;
    if rows != cols {
        return Err(LinkRankError::ShapeMismatch {
            expected: rows,
            found: cols,
        });
    }
    let nnz = cursor.len()?;
    cursor.expect_remaining(nnz.saturating_mul(16))?;

    let mut row_idx = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        row_idx.push(cursor.u32()?);
    }
    let mut col_idx = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        col_idx.push(cursor.u32()?);
    }
    let mut counts = Vec::with_capacity(nnz);
    for _ in 0..nnz {
        counts.push(cursor.u64()?);
    }
    AdjacencyMatrix::from_parts(rows, row_idx, col_idx, counts)
}

pub fn save_adjacency(path: &Path, matrix: &AdjacencyMatrix) -> LinkRankResult<()> {
    fs::write(path, encode_adjacency(matrix))?;
    Ok(())
}

pub fn load_adjacency(path: &Path) -> LinkRankResult<AdjacencyMatrix> {
    decode_adjacency(&fs::read(path)?)
}

/// Load and require shape `(node_count, node_count)`.
pub fn load_adjacency_expecting(path: &Path, node_count: usize) -> LinkRankResult<AdjacencyMatrix> {
    let matrix = load_adjacency(path)?;
    if matrix.node_count() != node_count {
        return Err(LinkRankError::ShapeMismatch {
            expected: node_count,
            found: matrix.node_count(),
        });
    }
    Ok(matrix)
}
