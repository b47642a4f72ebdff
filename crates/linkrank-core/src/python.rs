//! PyO3 bindings: the engine over an id-pair list, and the full TSV pipeline.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::config::{
    BuildConfig, RankConfig, DEFAULT_BATCH_SIZE, DEFAULT_DAMPING, DEFAULT_MAX_ITERATIONS,
    DEFAULT_THRESHOLD, DEFAULT_TOP_K,
};
use crate::errors::LinkRankResult;
use crate::graph::sparse::AdjacencyMatrix;
use crate::models::{EdgeRecord, EncodedBatch, SENTINEL_ID};
use crate::pipeline::{run_pipeline, TsvLinkSource};
use crate::rank::engine::PageRankEngine;
use crate::rank::observer::TracingObserver;

/// Rank `node_count` pages linked by `edges` (`(source, target)` ids; a
/// target of `-1` is ignored). Returns `(scores, converged, iterations)`.
#[pyfunction]
#[pyo3(signature = (
    node_count,
    edges,
    damping=DEFAULT_DAMPING,
    threshold=DEFAULT_THRESHOLD,
    max_iterations=DEFAULT_MAX_ITERATIONS,
))]
pub fn pagerank_edges(
    py: Python<'_>,
    node_count: usize,
    edges: Vec<(i64, i64)>,
    damping: f64,
    threshold: f64,
    max_iterations: usize,
) -> PyResult<(Vec<f64>, bool, usize)> {
    let config = RankConfig::default()
        .with_damping(damping)
        .with_threshold(threshold)
        .with_max_iterations(max_iterations);

    let result = py.allow_threads(move || -> LinkRankResult<(Vec<f64>, bool, usize)> {
        let batch: EncodedBatch = edges
            .iter()
            .map(|&(source_id, target_id)| EdgeRecord {
                source_id,
                target_id,
            })
            .collect();
        let adjacency = AdjacencyMatrix::from_batch(node_count, &batch, "python edges")?.matrix;
        let engine = PageRankEngine::new(config)?;
        let outcome = engine.run_adjacency(&adjacency, TracingObserver::default())?;
        Ok((outcome.scores, outcome.converged, outcome.iterations))
    })?;
    Ok(result)
}

/// Run the whole pipeline over `title<TAB>link` files into `workdir`.
/// Returns the run report as JSON.
#[pyfunction]
#[pyo3(signature = (
    paths,
    workdir,
    damping=DEFAULT_DAMPING,
    threshold=DEFAULT_THRESHOLD,
    max_iterations=DEFAULT_MAX_ITERATIONS,
    top_k=DEFAULT_TOP_K,
    batch_size=DEFAULT_BATCH_SIZE,
    workers=None,
))]
#[allow(clippy::too_many_arguments)]
pub fn run_pipeline_tsv(
    py: Python<'_>,
    paths: Vec<PathBuf>,
    workdir: PathBuf,
    damping: f64,
    threshold: f64,
    max_iterations: usize,
    top_k: usize,
    batch_size: usize,
    workers: Option<usize>,
) -> PyResult<String> {
    let rank = RankConfig::default()
        .with_damping(damping)
        .with_threshold(threshold)
        .with_max_iterations(max_iterations)
        .with_top_k(top_k);
    let mut build = BuildConfig::default().with_batch_size(batch_size);
    if let Some(workers) = workers {
        build = build.with_workers(workers);
    }

    let json = py.allow_threads(move || -> LinkRankResult<String> {
        let source = TsvLinkSource::new(paths, build.batch_size);
        let report = run_pipeline(&source, &workdir, &rank, &build)?;
        Ok(serde_json::to_string(&report)?)
    })?;
    Ok(json)
}

#[pymodule]
fn linkrank_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("SENTINEL_ID", SENTINEL_ID)?;
    m.add("DEFAULT_DAMPING", DEFAULT_DAMPING)?;
    m.add("DEFAULT_THRESHOLD", DEFAULT_THRESHOLD)?;
    m.add("DEFAULT_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS)?;

    m.add_function(wrap_pyfunction!(pagerank_edges, m)?)?;
    m.add_function(wrap_pyfunction!(run_pipeline_tsv, m)?)?;
    Ok(())
}
