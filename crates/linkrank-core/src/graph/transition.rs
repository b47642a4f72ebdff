//! Row-normalized transition operator, stored transposed.
//!
//! `P[i, j] = A[i, j] / max(1, out_degree(i))`. Entries are grouped by target
//! column so that `Pᵗ · π` is a pull over each page's in-links: every output
//! element is computed independently, in a fixed order, which keeps the
//! row-parallel product bit-identical to a sequential one.

use rayon::prelude::*;

use crate::graph::sparse::AdjacencyMatrix;

/// Minimum rows per Rayon task in the product.
const PAR_MIN_ROWS: usize = 4096;

#[derive(Clone, Debug)]
pub struct TransitionOperator {
    node_count: usize,
    /// Guarded out-degree: `0` replaced by `1`.
    out_degree: Vec<f64>,
    dangling: usize,
    in_ptr: Vec<usize>,
    in_src: Vec<u32>,
    in_weight: Vec<f64>,
}

impl TransitionOperator {
    pub fn from_adjacency(adjacency: &AdjacencyMatrix) -> Self {
        let node_count = adjacency.node_count();
        let raw_degree = adjacency.out_degrees();
        let dangling = raw_degree.iter().filter(|&&d| d == 0).count();
        let out_degree: Vec<f64> = raw_degree.iter().map(|&d| d.max(1) as f64).collect();

        let mut in_ptr = vec![0usize; node_count + 1];
        for &col in adjacency.cols() {
            in_ptr[col as usize + 1] += 1;
        }
        for j in 0..node_count {
            in_ptr[j + 1] += in_ptr[j];
        }

        let nnz = adjacency.nnz();
        let mut cursor = in_ptr.clone();
        let mut in_src = vec![0u32; nnz];
        let mut in_weight = vec![0.0f64; nnz];
        for (row, col, count) in adjacency.iter() {
            let slot = cursor[col as usize];
            in_src[slot] = row;
            in_weight[slot] = count as f64 / out_degree[row as usize];
            cursor[col as usize] += 1;
        }

        Self {
            node_count,
            out_degree,
            dangling,
            in_ptr,
            in_src,
            in_weight,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn nnz(&self) -> usize {
        self.in_src.len()
    }

    /// Pages with no resolved outgoing link.
    pub fn dangling_count(&self) -> usize {
        self.dangling
    }

    pub fn out_degree(&self, node: u32) -> f64 {
        self.out_degree[node as usize]
    }

    /// `(source, P[source, target])` for every in-link of `target`.
    pub fn in_links(&self, target: u32) -> impl Iterator<Item = (u32, f64)> + '_ {
        let start = self.in_ptr[target as usize];
        let end = self.in_ptr[target as usize + 1];
        (start..end).map(move |k| (self.in_src[k], self.in_weight[k]))
    }

    /// `sum_j P[i, j]` per row: `1.0` for linked pages, `0.0` for dangling ones.
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0f64; self.node_count];
        for (src, weight) in self.in_src.iter().zip(self.in_weight.iter()) {
            sums[*src as usize] += weight;
        }
        sums
    }

    /// `out = damping · Pᵗ · pi + (1 - damping) · teleport`.
    pub fn damped_product(&self, pi: &[f64], damping: f64, teleport: f64, out: &mut [f64]) {
        let base = (1.0 - damping) * teleport;
        out.par_iter_mut()
            .with_min_len(PAR_MIN_ROWS)
            .enumerate()
            .for_each(|(j, slot)| {
                let mut incoming = 0.0;
                for k in self.in_ptr[j]..self.in_ptr[j + 1] {
                    incoming += self.in_weight[k] * pi[self.in_src[k] as usize];
                }
                *slot = damping * incoming + base;
            });
    }
}
