//! Title-pair → id-pair encoding over bounded batches.

use serde::{Deserialize, Serialize};

use crate::errors::{LinkRankError, LinkRankResult};
use crate::indexer::titles::TitleIndex;
use crate::models::{EncodedBatch, TitlePair, SENTINEL_ID};

/// Row counts for one or more encoded batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeStats {
    pub rows: u64,
    pub resolved: u64,
    pub unresolved: u64,
    /// Pages without links; they feed the index but emit no edge.
    pub linkless: u64,
}

impl EncodeStats {
    pub fn absorb(&mut self, other: EncodeStats) {
        self.rows += other.rows;
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
        self.linkless += other.linkless;
    }
}

/// Stateless encoder sharing a read-only [`TitleIndex`].
#[derive(Clone, Copy, Debug)]
pub struct LinkEncoder<'a> {
    index: &'a TitleIndex,
}

impl<'a> LinkEncoder<'a> {
    pub fn new(index: &'a TitleIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &'a TitleIndex {
        self.index
    }

    /// Encode one batch. A missing target becomes [`SENTINEL_ID`]; a missing
    /// source is a consistency error since every page title was indexed.
    pub fn encode_batch(&self, pairs: &[TitlePair]) -> LinkRankResult<(EncodedBatch, EncodeStats)> {
        let mut batch = EncodedBatch::with_capacity(pairs.len());
        let mut stats = EncodeStats::default();

        for pair in pairs {
            stats.rows += 1;
            let Some(link) = pair.link.as_deref() else {
                stats.linkless += 1;
                continue;
            };
            let source = self
                .index
                .get(&pair.title)
                .ok_or_else(|| LinkRankError::SourceNotFound {
                    title: pair.title.clone(),
                })?;
            let target = self.index.id_of(link);
            if target == SENTINEL_ID {
                stats.unresolved += 1;
            } else {
                stats.resolved += 1;
            }
            batch.sources.push(source);
            batch.targets.push(target);
        }

        Ok((batch, stats))
    }
}
