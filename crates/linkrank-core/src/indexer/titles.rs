//! Dense, order-independent title → id bijection.
//!
//! Ids are the rank of each distinct title under bytewise (code-point)
//! ordering, so the assignment depends only on the *set* of titles and is
//! reproducible across reruns and across partitioned construction.

use std::collections::BTreeSet;

use indexmap::IndexSet;
use sha2::{Digest, Sha256};

use crate::errors::{LinkRankError, LinkRankResult};
use crate::models::{TitleId, TitlePair, SENTINEL_ID, UNKNOWN_TITLE};

/// Immutable bijection between distinct canonical titles and `[0, N)`.
#[derive(Clone, Debug)]
pub struct TitleIndex {
    titles: IndexSet<String>,
    fingerprint: String,
}

impl TitleIndex {
    /// Build from titles that are already sorted and distinct (e.g. loaded
    /// from a store). Rejects input that is not strictly ascending.
    pub fn from_sorted_unique(titles: Vec<String>) -> LinkRankResult<Self> {
        if let Some(pos) = titles.windows(2).position(|w| w[0] >= w[1]) {
            return Err(LinkRankError::Corrupt(format!(
                "title list not strictly ascending at position {}: {:?} >= {:?}",
                pos + 1,
                titles[pos],
                titles[pos + 1]
            )));
        }
        Ok(Self::from_ordered(titles.into_iter()))
    }

    /// Build from an arbitrary multiset of titles.
    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = TitleIndexBuilder::new();
        for title in titles {
            builder.observe(title.as_ref());
        }
        builder.finish()
    }

    fn from_ordered(ordered: impl Iterator<Item = String>) -> Self {
        let titles: IndexSet<String> = ordered.collect();
        let fingerprint = fingerprint_titles(titles.iter().map(String::as_str));
        Self {
            titles,
            fingerprint,
        }
    }

    /// Number of distinct titles (`N`).
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn get(&self, title: &str) -> Option<TitleId> {
        self.titles.get_index_of(title).map(|i| i as TitleId)
    }

    /// Id of `title`, or [`SENTINEL_ID`] when it is not indexed.
    pub fn id_of(&self, title: &str) -> TitleId {
        self.get(title).unwrap_or(SENTINEL_ID)
    }

    pub fn try_title(&self, id: TitleId) -> Option<&str> {
        if id < 0 {
            return None;
        }
        self.titles.get_index(id as usize).map(String::as_str)
    }

    /// Title for `id`, or [`UNKNOWN_TITLE`] for the sentinel and out-of-range ids.
    pub fn title_of(&self, id: TitleId) -> &str {
        self.try_title(id).unwrap_or(UNKNOWN_TITLE)
    }

    /// Vectorised lookup over a bounded batch.
    pub fn lookup_batch<S: AsRef<str>>(&self, titles: &[S]) -> Vec<TitleId> {
        titles.iter().map(|t| self.id_of(t.as_ref())).collect()
    }

    /// Titles in id order.
    pub fn titles(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.titles.iter().map(String::as_str)
    }

    /// Hex SHA-256 over the ordered, length-prefixed titles.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

pub(crate) fn fingerprint_titles<'a>(titles: impl Iterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for title in titles {
        hasher.update((title.len() as u64).to_le_bytes());
        hasher.update(title.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Streaming distinct-title collector.
///
/// Memory is proportional to the number of distinct titles; duplicates are
/// dropped as they arrive. Builders over disjoint shards combine with
/// [`TitleIndexBuilder::merge`].
#[derive(Clone, Debug, Default)]
pub struct TitleIndexBuilder {
    seen: BTreeSet<String>,
    observed: u64,
}

impl TitleIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, title: &str) {
        self.observed += 1;
        if !self.seen.contains(title) {
            self.seen.insert(title.to_owned());
        }
    }

    /// Observe the page titles of a batch. Link targets are not indexed: a
    /// link to a title that never appears as a page resolves to the sentinel.
    pub fn observe_pairs(&mut self, pairs: &[TitlePair]) {
        for pair in pairs {
            self.observe(&pair.title);
        }
    }

    /// Set union with another builder.
    pub fn merge(mut self, other: TitleIndexBuilder) -> Self {
        self.observed += other.observed;
        if self.seen.len() < other.seen.len() {
            let mut larger = other.seen;
            larger.append(&mut self.seen);
            self.seen = larger;
        } else {
            let mut other_seen = other.seen;
            self.seen.append(&mut other_seen);
        }
        self
    }

    /// Occurrences observed so far, duplicates included.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn distinct(&self) -> usize {
        self.seen.len()
    }

    pub fn finish(self) -> TitleIndex {
        TitleIndex::from_ordered(self.seen.into_iter())
    }
}
