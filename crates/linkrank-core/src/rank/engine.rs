//! Damped power iteration with explicit convergence detection.
//!
//! `π_{k+1} = d · Pᵗ · π_k + (1 - d) · t`, starting from the all-ones vector
//! with a uniform teleport `t = 1/N`. Dangling rows of `P` are all-zero, so a
//! dangling page keeps no outward flow; its mass only returns through the
//! teleport term. The run stops when `‖π_k - π_{k+1}‖₁ < N · ε` or after
//! `max_iterations` steps.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RankConfig;
use crate::errors::{LinkRankError, LinkRankResult};
use crate::graph::sparse::AdjacencyMatrix;
use crate::graph::transition::TransitionOperator;
use crate::rank::observer::{IterationEvent, IterationObserver};

/// Lifecycle of a run. Only `Converged` and `Exhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Initialized,
    Iterating,
    Converged,
    Exhausted,
}

/// Result of a run: raw scores in id order plus convergence diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankOutcome {
    pub scores: Vec<f64>,
    pub state: RunState,
    pub converged: bool,
    /// Iterations actually performed.
    pub iterations: usize,
    /// L1 delta of the last iteration.
    pub final_delta: f64,
}

impl RankOutcome {
    /// Scores rescaled to sum to `1.0`.
    pub fn normalized(&self) -> Vec<f64> {
        let total: f64 = self.scores.iter().sum();
        if total > 0.0 {
            self.scores.iter().map(|s| s / total).collect()
        } else {
            self.scores.clone()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRankEngine {
    config: RankConfig,
}

impl PageRankEngine {
    /// Validates `config` up front; an invalid configuration never runs.
    pub fn new(config: RankConfig) -> LinkRankResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RankConfig {
        &self.config
    }

    pub fn run_adjacency<O: IterationObserver>(
        &self,
        adjacency: &AdjacencyMatrix,
        observer: O,
    ) -> LinkRankResult<RankOutcome> {
        let operator = TransitionOperator::from_adjacency(adjacency);
        self.run(&operator, observer)
    }

    pub fn run<O: IterationObserver>(
        &self,
        operator: &TransitionOperator,
        mut observer: O,
    ) -> LinkRankResult<RankOutcome> {
        let n = operator.node_count();
        if n == 0 {
            return Err(LinkRankError::EmptyGraph);
        }

        let damping = self.config.damping;
        let teleport = 1.0 / n as f64;
        let tolerance = n as f64 * self.config.threshold;

        let mut state = RunState::Initialized;
        let mut pi = vec![1.0f64; n];
        let mut next = vec![0.0f64; n];
        let mut iterations = 0usize;
        let mut delta = f64::INFINITY;

        debug!(
            nodes = n,
            nnz = operator.nnz(),
            dangling = operator.dangling_count(),
            damping,
            tolerance,
            "starting power iteration"
        );

        for k in 0..self.config.max_iterations {
            state = RunState::Iterating;
            operator.damped_product(&pi, damping, teleport, &mut next);
            delta = l1_distance(&pi, &next);
            std::mem::swap(&mut pi, &mut next);
            iterations = k + 1;

            observer.on_iteration(&IterationEvent {
                iteration: k,
                scores: &pi,
                delta,
                tolerance,
            });

            if delta < tolerance {
                state = RunState::Converged;
                break;
            }
        }
        if state != RunState::Converged {
            state = RunState::Exhausted;
        }

        observer.on_finish(state, iterations);

        Ok(RankOutcome {
            scores: pi,
            state,
            converged: state == RunState::Converged,
            iterations,
            final_delta: delta,
        })
    }
}

/// Sequential so the result does not depend on thread scheduling.
fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EncodedBatch;
    use crate::rank::observer::NoopObserver;
    use crate::rank::topk::TopKRecorder;

    fn adjacency(n: usize, pairs: &[(i64, i64)]) -> AdjacencyMatrix {
        let batch = EncodedBatch {
            sources: pairs.iter().map(|p| p.0).collect(),
            targets: pairs.iter().map(|p| p.1).collect(),
        };
        AdjacencyMatrix::from_batch(n, &batch, "test").unwrap().matrix
    }

    fn engine() -> PageRankEngine {
        PageRankEngine::new(RankConfig::default()).unwrap()
    }

    #[test]
    fn test_cycle_converges_to_equal_scores() {
        let a = adjacency(3, &[(0, 1), (1, 2), (2, 0)]);
        let outcome = engine().run_adjacency(&a, NoopObserver).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.state, RunState::Converged);
        assert!(outcome.iterations < 100);
        for s in &outcome.scores {
            assert!((s - 1.0 / 3.0).abs() < 1e-6, "score {s}");
        }
    }

    #[test]
    fn test_dangling_page_gets_more_but_gives_nothing() {
        // X = 0 -> Y = 1; Y has no outgoing links.
        let a = adjacency(2, &[(0, 1)]);
        let outcome = engine().run_adjacency(&a, NoopObserver).unwrap();
        assert!(outcome.converged);
        let (x, y) = (outcome.scores[0], outcome.scores[1]);
        assert!(y > x);
        // X only ever receives the teleport share.
        assert!((x - 0.15 / 2.0).abs() < 1e-12);
        assert!((y - (0.85 * x + 0.15 / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_no_edges_is_pure_teleport() {
        let a = AdjacencyMatrix::empty(5).unwrap();
        let mut recorder = TopKRecorder::new(10);
        let outcome = engine().run_adjacency(&a, &mut recorder).unwrap();
        assert!(outcome.converged);
        // The fixed point is reached by the first step and confirmed by the next.
        assert_eq!(outcome.iterations, 2);
        let first = &recorder.history()[0].entries;
        assert!(first.iter().all(|e| (e.score - 0.15 / 5.0).abs() < 1e-15));
        for p in outcome.normalized() {
            assert!((p - 0.2).abs() < 1e-12);
        }
        assert!(outcome.scores.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_single_page() {
        let a = AdjacencyMatrix::empty(1).unwrap();
        let outcome = engine().run_adjacency(&a, NoopObserver).unwrap();
        assert!(outcome.converged);
        // 1 -> 0.15 on the first step, confirmed by the second.
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.scores.len(), 1);
        assert!((outcome.scores[0] - 0.15).abs() < 1e-15);
        assert_eq!(outcome.normalized(), vec![1.0]);

        // With a self-loop the all-ones start is already the fixed point.
        let looped = adjacency(1, &[(0, 0)]);
        let outcome = engine().run_adjacency(&looped, NoopObserver).unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!((outcome.scores[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_graph_is_distinct_error() {
        let a = AdjacencyMatrix::empty(0).unwrap();
        let err = engine().run_adjacency(&a, NoopObserver).unwrap_err();
        assert!(matches!(err, LinkRankError::EmptyGraph));
    }

    #[test]
    fn test_iteration_cap_reports_exhausted() {
        let a = adjacency(3, &[(0, 1), (1, 2), (2, 0)]);
        let engine = PageRankEngine::new(RankConfig::default().with_max_iterations(5)).unwrap();
        let mut recorder = TopKRecorder::new(10);
        let outcome = engine.run_adjacency(&a, &mut recorder).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.state, RunState::Exhausted);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(recorder.history().len(), 5);
        let tags: Vec<usize> = recorder.history().iter().map(|s| s.iteration).collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_config_rejected_before_running() {
        let err = PageRankEngine::new(RankConfig::default().with_damping(1.0)).unwrap_err();
        assert!(matches!(err, LinkRankError::Config(_)));
    }

    #[test]
    fn test_scores_non_negative_and_finite() {
        // Mixed graph: hub, dangling pages, self loops, multi-edges.
        let a = adjacency(
            6,
            &[(0, 1), (0, 1), (0, 2), (1, 0), (2, 2), (3, 0), (3, 1), (3, 2), (4, 0)],
        );
        for d in [0.05, 0.5, 0.85, 0.99] {
            let engine = PageRankEngine::new(RankConfig::default().with_damping(d)).unwrap();
            let outcome = engine.run_adjacency(&a, NoopObserver).unwrap();
            assert!(outcome.scores.iter().all(|s| s.is_finite() && *s >= 0.0));
        }
    }

    #[test]
    fn test_snapshot_length_bounded() {
        let a = adjacency(3, &[(0, 1)]);
        let mut recorder = TopKRecorder::new(10);
        engine().run_adjacency(&a, &mut recorder).unwrap();
        assert!(recorder.history().iter().all(|s| s.entries.len() == 3));
        let mut recorder = TopKRecorder::new(2);
        engine().run_adjacency(&a, &mut recorder).unwrap();
        assert!(recorder.history().iter().all(|s| s.entries.len() == 2));
    }
}
