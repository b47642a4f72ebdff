//! Out-of-core accumulation of encoded batches into one adjacency matrix.
//!
//! Every batch becomes an independent partial matrix; partials are combined
//! with [`AdjacencyMatrix::merge`]. Three drivers share that fold:
//! a sequential one, a Rayon tree-reduce over indexable partitions, and a
//! mutex-guarded accumulator for streams of unknown length.

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LinkRankResult;
use crate::graph::sparse::{check_node_count, AdjacencyMatrix};
use crate::models::EncodedBatch;

/// Counters describing one accumulation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyStats {
    pub batches: u64,
    pub rows: u64,
    /// Rows dropped because their target was the sentinel.
    pub discarded: u64,
}

impl AdjacencyStats {
    fn combine(self, other: AdjacencyStats) -> AdjacencyStats {
        AdjacencyStats {
            batches: self.batches + other.batches,
            rows: self.rows + other.rows,
            discarded: self.discarded + other.discarded,
        }
    }
}

/// Running total for a sequential fold.
#[derive(Debug)]
pub struct AdjacencyBuilder {
    total: AdjacencyMatrix,
    stats: AdjacencyStats,
}

impl AdjacencyBuilder {
    pub fn new(node_count: usize) -> LinkRankResult<Self> {
        Ok(Self {
            total: AdjacencyMatrix::empty(node_count)?,
            stats: AdjacencyStats::default(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.total.node_count()
    }

    /// Turn `batch` into a partial matrix and add it to the total.
    pub fn fold_batch(&mut self, batch: &EncodedBatch, context: &str) -> LinkRankResult<()> {
        let (partial, stats) = partial_for(self.node_count(), batch, context)?;
        self.merge_partial(partial, stats)
    }

    /// Add an already-built partial. Shapes must agree.
    pub fn merge_partial(
        &mut self,
        partial: AdjacencyMatrix,
        stats: AdjacencyStats,
    ) -> LinkRankResult<()> {
        let node_count = self.node_count();
        let total = std::mem::replace(&mut self.total, AdjacencyMatrix::identity(node_count));
        self.total = total.merge(partial)?;
        self.stats = self.stats.combine(stats);
        Ok(())
    }

    pub fn stats(&self) -> AdjacencyStats {
        self.stats
    }

    pub fn finish(self) -> (AdjacencyMatrix, AdjacencyStats) {
        (self.total, self.stats)
    }
}

fn partial_for(
    node_count: usize,
    batch: &EncodedBatch,
    context: &str,
) -> LinkRankResult<(AdjacencyMatrix, AdjacencyStats)> {
    let part = AdjacencyMatrix::from_batch(node_count, batch, context)?;
    debug!(
        context,
        rows = batch.len(),
        discarded = part.discarded,
        nnz = part.matrix.nnz(),
        "built partial adjacency"
    );
    let stats = AdjacencyStats {
        batches: 1,
        rows: batch.len() as u64,
        discarded: part.discarded,
    };
    Ok((part.matrix, stats))
}

/// Fold batches one at a time; only one batch and the running total are live.
pub fn build_sequential<I>(
    node_count: usize,
    batches: I,
) -> LinkRankResult<(AdjacencyMatrix, AdjacencyStats)>
where
    I: IntoIterator<Item = LinkRankResult<EncodedBatch>>,
{
    let mut builder = AdjacencyBuilder::new(node_count)?;
    for (idx, batch) in batches.into_iter().enumerate() {
        let batch = batch?;
        builder.fold_batch(&batch, &format!("batch {idx}"))?;
    }
    Ok(builder.finish())
}

/// Parallel map over `partitions` indexable partitions followed by a tree
/// reduce. `load` is called once per partition index, possibly concurrently.
pub fn build_parallel<F>(
    node_count: usize,
    partitions: usize,
    workers: usize,
    load: F,
) -> LinkRankResult<(AdjacencyMatrix, AdjacencyStats)>
where
    F: Fn(usize) -> LinkRankResult<EncodedBatch> + Sync,
{
    check_node_count(node_count)?;
    let run = || {
        (0..partitions)
            .into_par_iter()
            .map(|p| {
                let batch = load(p)?;
                partial_for(node_count, &batch, &format!("partition {p}"))
            })
            .try_reduce(
                || (AdjacencyMatrix::identity(node_count), AdjacencyStats::default()),
                |(a, sa), (b, sb)| Ok((a.merge(b)?, sa.combine(sb))),
            )
    };

    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(_) => build_sequential(node_count, (0..partitions).map(&load)),
    }
}

/// Accumulator shared between workers; each partial is merged under a lock.
#[derive(Debug)]
pub struct SharedAccumulator {
    inner: Mutex<AdjacencyBuilder>,
}

impl SharedAccumulator {
    pub fn new(node_count: usize) -> LinkRankResult<Self> {
        Ok(Self {
            inner: Mutex::new(AdjacencyBuilder::new(node_count)?),
        })
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().node_count()
    }

    /// Build the partial outside the lock, then merge it in.
    pub fn fold_batch(&self, batch: &EncodedBatch, context: &str) -> LinkRankResult<()> {
        let node_count = self.node_count();
        let (partial, stats) = partial_for(node_count, batch, context)?;
        self.inner.lock().merge_partial(partial, stats)
    }

    pub fn finish(self) -> (AdjacencyMatrix, AdjacencyStats) {
        self.inner.into_inner().finish()
    }
}

/// Parallel fold over a stream of unknown length via a shared accumulator.
pub fn build_streaming<I>(
    node_count: usize,
    batches: I,
    workers: usize,
) -> LinkRankResult<(AdjacencyMatrix, AdjacencyStats)>
where
    I: Iterator<Item = LinkRankResult<EncodedBatch>> + Send,
{
    let accumulator = SharedAccumulator::new(node_count)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            batches
                .enumerate()
                .par_bridge()
                .try_for_each(|(idx, batch)| {
                    accumulator.fold_batch(&batch?, &format!("batch {idx}"))
                })
        })?,
        Err(_) => {
            for (idx, batch) in batches.enumerate() {
                accumulator.fold_batch(&batch?, &format!("batch {idx}"))?;
            }
        }
    }

    Ok(accumulator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LinkRankError;
    use crate::models::SENTINEL_ID;

    fn batch(pairs: &[(i64, i64)]) -> EncodedBatch {
        EncodedBatch {
            sources: pairs.iter().map(|p| p.0).collect(),
            targets: pairs.iter().map(|p| p.1).collect(),
        }
    }

    fn edges() -> Vec<(i64, i64)> {
        vec![
            (0, 1),
            (1, 2),
            (2, 0),
            (0, 1),
            (3, SENTINEL_ID),
            (3, 0),
            (4, 4),
            (0, 3),
            (1, 2),
            (2, SENTINEL_ID),
            (0, 0),
        ]
    }

    #[test]
    fn test_batch_boundaries_do_not_matter() {
        let all = edges();
        let (single, single_stats) = build_sequential(5, vec![Ok(batch(&all))]).unwrap();

        let chunked: Vec<LinkRankResult<EncodedBatch>> =
            all.chunks(3).map(|c| Ok(batch(c))).collect();
        let (chunks, chunk_stats) = build_sequential(5, chunked).unwrap();

        let reversed: Vec<LinkRankResult<EncodedBatch>> =
            all.chunks(2).rev().map(|c| Ok(batch(c))).collect();
        let (rev, _) = build_sequential(5, reversed).unwrap();

        assert_eq!(single, chunks);
        assert_eq!(single, rev);
        assert_eq!(single_stats.discarded, 2);
        assert_eq!(chunk_stats.discarded, 2);
        assert_eq!(chunk_stats.rows, all.len() as u64);
        assert_eq!(single.total_weight(), 9);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let all = edges();
        let parts: Vec<EncodedBatch> = all.chunks(2).map(batch).collect();
        let (seq, _) = build_sequential(5, parts.iter().cloned().map(Ok)).unwrap();
        let (par, stats) = build_parallel(5, parts.len(), 4, |p| Ok(parts[p].clone())).unwrap();
        assert_eq!(seq, par);
        assert_eq!(stats.batches, parts.len() as u64);
    }

    #[test]
    fn test_streaming_matches_sequential() {
        let all = edges();
        let parts: Vec<EncodedBatch> = all.chunks(4).map(batch).collect();
        let (seq, _) = build_sequential(5, parts.iter().cloned().map(Ok)).unwrap();
        let (streamed, stats) = build_streaming(5, parts.clone().into_iter().map(Ok), 3).unwrap();
        assert_eq!(seq, streamed);
        assert_eq!(stats.discarded, 2);
    }

    #[test]
    fn test_bad_partition_aborts_parallel_build() {
        let parts = vec![batch(&[(0, 1)]), batch(&[(9, 1)])];
        let err = build_parallel(2, parts.len(), 2, |p| Ok(parts[p].clone())).unwrap_err();
        assert!(matches!(err, LinkRankError::IdOutOfRange { id: 9, .. }));
    }

    #[test]
    fn test_load_error_propagates() {
        let err = build_parallel(2, 3, 2, |p| {
            if p == 1 {
                Err(LinkRankError::Corrupt("partition 1".to_string()))
            } else {
                Ok(batch(&[(0, 1)]))
            }
        })
        .unwrap_err();
        assert!(matches!(err, LinkRankError::Corrupt(_)));
    }

    #[test]
    fn test_merge_partial_rejects_other_shape() {
        let mut builder = AdjacencyBuilder::new(3).unwrap();
        let foreign = AdjacencyMatrix::empty(4).unwrap();
        let err = builder
            .merge_partial(foreign, AdjacencyStats::default())
            .unwrap_err();
        assert!(matches!(err, LinkRankError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_stream_yields_empty_matrix() {
        let (m, stats) = build_sequential(4, Vec::new()).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.shape(), (4, 4));
        assert_eq!(stats.batches, 0);
    }
}
