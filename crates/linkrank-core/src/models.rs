//! Shared typed models used across indexing, graph, ranking, and storage layers.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifier contract
// ---------------------------------------------------------------------------

/// Dense page identifier in `[0, N)`; persisted as a 64-bit signed integer.
pub type TitleId = i64;

/// Reserved id for "title not present in the index". Distinct from every valid id, including `0`.
pub const SENTINEL_ID: TitleId = -1;

/// Marker returned when decoding the sentinel or an out-of-range id.
pub const UNKNOWN_TITLE: &str = "?";

// ---------------------------------------------------------------------------
// 1. TitlePair
// ---------------------------------------------------------------------------

/// One upstream record: a canonical page title and one outgoing link title.
///
/// `link` is `None` for pages that carry no links; such rows only feed the index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TitlePair {
    pub title: String,
    pub link: Option<String>,
}

impl TitlePair {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: Some(link.into()),
        }
    }

    pub fn page(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: None,
        }
    }
}

// ---------------------------------------------------------------------------
// 2. EdgeRecord / EncodedBatch
// ---------------------------------------------------------------------------

/// An encoded edge. `target_id` may be [`SENTINEL_ID`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source_id: TitleId,
    pub target_id: TitleId,
}

impl EdgeRecord {
    pub fn is_resolved(&self) -> bool {
        self.target_id != SENTINEL_ID
    }
}

/// A batch of encoded edges in columnar form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodedBatch {
    pub sources: Vec<TitleId>,
    pub targets: Vec<TitleId>,
}

impl EncodedBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::with_capacity(capacity),
            targets: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: EdgeRecord) {
        self.sources.push(record.source_id);
        self.targets.push(record.target_id);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = EdgeRecord> + '_ {
        self.sources
            .iter()
            .zip(self.targets.iter())
            .map(|(&source_id, &target_id)| EdgeRecord {
                source_id,
                target_id,
            })
    }
}

impl FromIterator<EdgeRecord> for EncodedBatch {
    fn from_iter<I: IntoIterator<Item = EdgeRecord>>(iter: I) -> Self {
        let mut batch = EncodedBatch::default();
        for record in iter {
            batch.push(record);
        }
        batch
    }
}

// ---------------------------------------------------------------------------
// 3. Scores
// ---------------------------------------------------------------------------

/// A page id paired with its score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageScore {
    pub id: TitleId,
    pub score: f64,
}

/// A decoded row of the final ranking table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedTitle {
    pub title: String,
    pub score: f64,
}
