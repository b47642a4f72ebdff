//! Top-K diagnostics recorded once per iteration.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::models::{PageScore, TitleId};
use crate::rank::observer::{IterationEvent, IterationObserver};

/// The `k` best pages after one iteration, descending by score, ties by ascending id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopKSnapshot {
    pub iteration: usize,
    pub entries: Vec<PageScore>,
}

/// `a` ranks ahead of `b`: higher score first, then lower id.
fn ahead(a: &PageScore, b: &PageScore) -> bool {
    match b.score.total_cmp(&a.score) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => a.id < b.id,
    }
}

/// Select the top `k` of `scores` in one pass, keeping a sorted buffer of at most `k`.
pub fn top_k(scores: &[f64], k: usize) -> Vec<PageScore> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }

    let mut best: Vec<PageScore> = Vec::with_capacity(k + 1);
    for (id, &score) in scores.iter().enumerate() {
        let candidate = PageScore {
            id: id as TitleId,
            score,
        };
        if best.len() == k && !ahead(&candidate, &best[k - 1]) {
            continue;
        }
        let pos = best.partition_point(|held| ahead(held, &candidate));
        best.insert(pos, candidate);
        best.truncate(k);
    }
    best
}

/// Observer that keeps the full snapshot history.
#[derive(Clone, Debug)]
pub struct TopKRecorder {
    k: usize,
    history: Vec<TopKSnapshot>,
}

impl TopKRecorder {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[TopKSnapshot] {
        &self.history
    }

    pub fn into_history(self) -> Vec<TopKSnapshot> {
        self.history
    }

    /// Every id that appeared in any snapshot, in first-seen order.
    pub fn distinct_ids(&self) -> Vec<TitleId> {
        let mut ids: IndexSet<TitleId> = IndexSet::new();
        for snapshot in &self.history {
            ids.extend(snapshot.entries.iter().map(|e| e.id));
        }
        ids.into_iter().collect()
    }

    /// [`distinct_ids`](Self::distinct_ids) reordered by `final_scores`, best first.
    pub fn ordered_by_final_score(&self, final_scores: &[f64]) -> Vec<TitleId> {
        let mut ids: Vec<PageScore> = self
            .distinct_ids()
            .into_iter()
            .map(|id| PageScore {
                id,
                score: final_scores.get(id as usize).copied().unwrap_or(0.0),
            })
            .collect();
        ids.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        ids.into_iter().map(|p| p.id).collect()
    }
}

impl Default for TopKRecorder {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TOP_K)
    }
}

impl IterationObserver for TopKRecorder {
    fn on_iteration(&mut self, event: &IterationEvent<'_>) {
        self.history.push(TopKSnapshot {
            iteration: event.iteration,
            entries: top_k(event.scores, self.k),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(entries: &[PageScore]) -> Vec<TitleId> {
        entries.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_top_k_orders_descending_with_id_ties() {
        let scores = [0.1, 0.5, 0.3, 0.5, 0.0, 0.3];
        let top = top_k(&scores, 4);
        assert_eq!(ids(&top), vec![1, 3, 2, 5]);
        assert_eq!(top[0].score, 0.5);
    }

    #[test]
    fn test_top_k_length_is_min_k_n() {
        assert_eq!(top_k(&[1.0, 2.0], 10).len(), 2);
        assert!(top_k(&[], 10).is_empty());
        assert!(top_k(&[1.0], 0).is_empty());
        let many: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let top = top_k(&many, 10);
        assert_eq!(top.len(), 10);
        assert_eq!(ids(&top), (40..50).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_top_k_all_ties() {
        let top = top_k(&[0.2; 12], 10);
        assert_eq!(ids(&top), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_top_k_matches_full_sort() {
        let scores: Vec<f64> = (0..200).map(|i| ((i * 37) % 23) as f64 / 7.0).collect();
        let mut full: Vec<PageScore> = scores
            .iter()
            .enumerate()
            .map(|(id, &score)| PageScore {
                id: id as TitleId,
                score,
            })
            .collect();
        full.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        full.truncate(10);
        assert_eq!(top_k(&scores, 10), full);
    }

    #[test]
    fn test_recorder_history_helpers() {
        let mut recorder = TopKRecorder::new(2);
        for (iteration, scores) in [[0.9, 0.1, 0.5], [0.1, 0.2, 0.7]].iter().enumerate() {
            recorder.on_iteration(&IterationEvent {
                iteration,
                scores,
                delta: 1.0,
                tolerance: 0.0,
            });
        }
        assert_eq!(recorder.history().len(), 2);
        assert_eq!(recorder.history()[1].iteration, 1);
        assert_eq!(recorder.distinct_ids(), vec![0, 2, 1]);
        assert_eq!(recorder.ordered_by_final_score(&[0.1, 0.2, 0.7]), vec![2, 1, 0]);
    }
}
