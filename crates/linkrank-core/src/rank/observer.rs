//! Per-iteration hooks for the power iteration.
//!
//! The engine calls [`IterationObserver::on_iteration`] exactly once after
//! each new rank vector is computed, before the convergence test, and
//! [`IterationObserver::on_finish`] once when it stops.

use tracing::{debug, info, warn};

use crate::rank::engine::RunState;

/// What an observer sees after iteration `iteration` (0-based).
#[derive(Debug, Clone, Copy)]
pub struct IterationEvent<'a> {
    pub iteration: usize,
    /// The freshly computed vector `π_{k+1}`.
    pub scores: &'a [f64],
    /// `sum_i |π_k[i] - π_{k+1}[i]|`.
    pub delta: f64,
    /// `N · ε`, the bound `delta` is compared against.
    pub tolerance: f64,
}

pub trait IterationObserver {
    fn on_iteration(&mut self, event: &IterationEvent<'_>);

    fn on_finish(&mut self, _state: RunState, _iterations: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IterationObserver for NoopObserver {
    fn on_iteration(&mut self, _event: &IterationEvent<'_>) {}
}

/// Emits a `debug` event every `every` iterations and an `info`/`warn`
/// event at the end of the run.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    every: usize,
}

impl TracingObserver {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IterationObserver for TracingObserver {
    fn on_iteration(&mut self, event: &IterationEvent<'_>) {
        if event.iteration % self.every == 0 {
            debug!(
                iteration = event.iteration,
                delta = event.delta,
                tolerance = event.tolerance,
                "pagerank iteration"
            );
        }
    }

    fn on_finish(&mut self, state: RunState, iterations: usize) {
        match state {
            RunState::Converged => info!(iterations, "PageRank converged"),
            RunState::Exhausted => {
                warn!(iterations, "PageRank hit the iteration cap without converging")
            }
            other => debug!(?other, iterations, "PageRank stopped"),
        }
    }
}

impl<O: IterationObserver + ?Sized> IterationObserver for &mut O {
    fn on_iteration(&mut self, event: &IterationEvent<'_>) {
        (**self).on_iteration(event);
    }

    fn on_finish(&mut self, state: RunState, iterations: usize) {
        (**self).on_finish(state, iterations);
    }
}

impl<A: IterationObserver, B: IterationObserver> IterationObserver for (A, B) {
    fn on_iteration(&mut self, event: &IterationEvent<'_>) {
        self.0.on_iteration(event);
        self.1.on_iteration(event);
    }

    fn on_finish(&mut self, state: RunState, iterations: usize) {
        self.0.on_finish(state, iterations);
        self.1.on_finish(state, iterations);
    }
}
