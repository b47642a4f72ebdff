//! Sparse `N × N` link-count matrix in canonical coordinate form.
//!
//! Entries are kept sorted by `(row, col)` with no duplicates and no zero
//! counts. Because the representation is canonical, [`AdjacencyMatrix::merge`]
//! is associative and commutative down to the bit: any batching or reduction
//! order over the same edge multiset yields an identical matrix.

use std::cmp::Ordering;

use crate::errors::{LinkRankError, LinkRankResult};
use crate::models::{EncodedBatch, TitleId, SENTINEL_ID};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    node_count: usize,
    rows: Vec<u32>,
    cols: Vec<u32>,
    counts: Vec<u64>,
}

/// Partial matrix for one batch plus the number of sentinel rows it dropped.
#[derive(Clone, Debug)]
pub struct BatchMatrix {
    pub matrix: AdjacencyMatrix,
    pub discarded: u64,
}

pub(crate) fn check_node_count(node_count: usize) -> LinkRankResult<()> {
    if node_count > u32::MAX as usize {
        return Err(LinkRankError::CapacityExceeded { node_count });
    }
    Ok(())
}

fn check_id(id: TitleId, node_count: usize, context: &str) -> LinkRankResult<u32> {
    if id < 0 || id as u64 >= node_count as u64 {
        return Err(LinkRankError::IdOutOfRange {
            id,
            node_count,
            context: context.to_string(),
        });
    }
    Ok(id as u32)
}

impl AdjacencyMatrix {
    /// The additive identity for [`merge`](Self::merge).
    pub fn empty(node_count: usize) -> LinkRankResult<Self> {
        check_node_count(node_count)?;
        Ok(Self::identity(node_count))
    }

    /// Caller has already checked `node_count`.
    pub(crate) fn identity(node_count: usize) -> Self {
        Self {
            node_count,
            rows: Vec::new(),
            cols: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// Build the partial matrix for one encoded batch: `+1` per resolved
    /// `(source, target)` occurrence.
    ///
    /// Rows whose target equals [`SENTINEL_ID`] are discarded. Any other id
    /// outside `[0, N)` aborts with [`LinkRankError::IdOutOfRange`].
    pub fn from_batch(
        node_count: usize,
        batch: &EncodedBatch,
        context: &str,
    ) -> LinkRankResult<BatchMatrix> {
        check_node_count(node_count)?;
        if batch.sources.len() != batch.targets.len() {
            return Err(LinkRankError::Corrupt(format!(
                "{context}: column lengths differ ({} sources, {} targets)",
                batch.sources.len(),
                batch.targets.len()
            )));
        }

        let mut pairs: Vec<(u32, u32)> = Vec::with_capacity(batch.len());
        let mut discarded = 0u64;
        for record in batch.records() {
            let source = check_id(record.source_id, node_count, &format!("{context} (source)"))?;
            if record.target_id == SENTINEL_ID {
                discarded += 1;
                continue;
            }
            let target = check_id(record.target_id, node_count, &format!("{context} (target)"))?;
            pairs.push((source, target));
        }
        pairs.sort_unstable();

        let mut matrix = Self::empty(node_count)?;
        for (row, col) in pairs {
            match (matrix.rows.last(), matrix.cols.last()) {
                (Some(&r), Some(&c)) if r == row && c == col => {
                    if let Some(last) = matrix.counts.last_mut() {
                        *last += 1;
                    }
                }
                _ => {
                    matrix.rows.push(row);
                    matrix.cols.push(col);
                    matrix.counts.push(1);
                }
            }
        }

        Ok(BatchMatrix { matrix, discarded })
    }

    /// Rebuild from stored coordinate columns, validating the canonical form.
    pub fn from_parts(
        node_count: usize,
        rows: Vec<u32>,
        cols: Vec<u32>,
        counts: Vec<u64>,
    ) -> LinkRankResult<Self> {
        check_node_count(node_count)?;
        if rows.len() != cols.len() || rows.len() != counts.len() {
            return Err(LinkRankError::Corrupt(format!(
                "coordinate columns differ in length: {} / {} / {}",
                rows.len(),
                cols.len(),
                counts.len()
            )));
        }
        for i in 0..rows.len() {
            if rows[i] as usize >= node_count || cols[i] as usize >= node_count {
                return Err(LinkRankError::IdOutOfRange {
                    id: i64::from(rows[i].max(cols[i])),
                    node_count,
                    context: format!("stored entry {i}"),
                });
            }
            if counts[i] == 0 {
                return Err(LinkRankError::Corrupt(format!("zero count at entry {i}")));
            }
            if i > 0 && (rows[i - 1], cols[i - 1]) >= (rows[i], cols[i]) {
                return Err(LinkRankError::Corrupt(format!(
                    "entries not strictly ordered at {i}"
                )));
            }
        }
        Ok(Self {
            node_count,
            rows,
            cols,
            counts,
        })
    }

    /// Element-wise sum of two matrices of the same shape.
    pub fn merge(self, other: AdjacencyMatrix) -> LinkRankResult<Self> {
        if self.node_count != other.node_count {
            return Err(LinkRankError::ShapeMismatch {
                expected: self.node_count,
                found: other.node_count,
            });
        }
        if other.is_empty() {
            return Ok(self);
        }
        if self.is_empty() {
            return Ok(other);
        }

        let capacity = self.nnz() + other.nnz();
        let mut out = Self {
            node_count: self.node_count,
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            counts: Vec::with_capacity(capacity),
        };

        let (mut i, mut j) = (0usize, 0usize);
        while i < self.nnz() && j < other.nnz() {
            let a = (self.rows[i], self.cols[i]);
            let b = (other.rows[j], other.cols[j]);
            match a.cmp(&b) {
                Ordering::Less => {
                    out.push(a, self.counts[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    out.push(b, other.counts[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    out.push(a, self.counts[i] + other.counts[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        for k in i..self.nnz() {
            out.push((self.rows[k], self.cols[k]), self.counts[k]);
        }
        for k in j..other.nnz() {
            out.push((other.rows[k], other.cols[k]), other.counts[k]);
        }

        Ok(out)
    }

    fn push(&mut self, (row, col): (u32, u32), count: u64) {
        self.rows.push(row);
        self.cols.push(col);
        self.counts.push(count);
    }

    /// `N`; the matrix shape is `(N, N)`.
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.node_count, self.node_count)
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all counts, i.e. the number of resolved edges folded in.
    pub fn total_weight(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn get(&self, row: u32, col: u32) -> u64 {
        let start = self.rows.partition_point(|&r| r < row);
        let end = self.rows.partition_point(|&r| r <= row);
        match self.cols[start..end].binary_search(&col) {
            Ok(k) => self.counts[start + k],
            Err(_) => 0,
        }
    }

    /// `sum_j A[i, j]` for every row.
    pub fn out_degrees(&self) -> Vec<u64> {
        let mut degrees = vec![0u64; self.node_count];
        for (row, count) in self.rows.iter().zip(self.counts.iter()) {
            degrees[*row as usize] += count;
        }
        degrees
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, u64)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.counts.iter())
            .map(|((&r, &c), &n)| (r, c, n))
    }

    pub fn rows(&self) -> &[u32] {
        &self.rows
    }

    pub fn cols(&self) -> &[u32] {
        &self.cols
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }
}
