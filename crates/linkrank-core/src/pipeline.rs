//! Stage orchestration: index titles, encode links, build the adjacency
//! matrix, rank. Every stage persists its artifact into a work directory and
//! can also be run on its own.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{BuildConfig, RankConfig};
use crate::errors::{LinkRankError, LinkRankResult};
use crate::graph::builder::{build_parallel, AdjacencyStats};
use crate::graph::sparse::AdjacencyMatrix;
use crate::indexer::encoder::{EncodeStats, LinkEncoder};
use crate::indexer::titles::TitleIndex;
use crate::models::{RankedTitle, TitlePair};
use crate::rank::engine::{PageRankEngine, RankOutcome, RunState};
use crate::rank::observer::TracingObserver;
use crate::rank::output::{write_ranking_tsv, write_scores_npy, write_scores_raw};
use crate::rank::topk::{TopKRecorder, TopKSnapshot};
use crate::store::edges::{EdgeDataset, EdgeDatasetWriter, EdgeManifest};
use crate::store::matrix::save_adjacency;
use crate::store::titles::SqliteTitleCollector;

pub const TITLES_DB: &str = "titles.sqlite";
pub const EDGES_DIR: &str = "edges";
pub const ADJACENCY_FILE: &str = "adjacency.bin";
pub const RANKING_FILE: &str = "ranking.tsv";
pub const SCORES_RAW_FILE: &str = "scores.f64";
pub const SCORES_NPY_FILE: &str = "scores.npy";
pub const REPORT_FILE: &str = "report.json";

pub type PairBatches<'a> = Box<dyn Iterator<Item = LinkRankResult<Vec<TitlePair>>> + Send + 'a>;

/// A re-entrant stream of title pairs: every call to `batches` starts over.
pub trait LinkSource: Sync {
    fn batches(&self) -> LinkRankResult<PairBatches<'_>>;
}

/// Pairs held in memory, served in `batch_size` chunks.
#[derive(Clone, Debug)]
pub struct MemoryLinkSource {
    pairs: Vec<TitlePair>,
    batch_size: usize,
}

impl MemoryLinkSource {
    pub fn new(pairs: Vec<TitlePair>, batch_size: usize) -> Self {
        Self {
            pairs,
            batch_size: batch_size.max(1),
        }
    }
}

impl LinkSource for MemoryLinkSource {
    fn batches(&self) -> LinkRankResult<PairBatches<'_>> {
        Ok(Box::new(
            self.pairs.chunks(self.batch_size).map(|chunk| Ok(chunk.to_vec())),
        ))
    }
}

/// `title<TAB>link` files, one shard per file. Blank lines are skipped and a
/// line without a tab is a page with no outgoing link.
#[derive(Clone, Debug)]
pub struct TsvLinkSource {
    paths: Vec<PathBuf>,
    batch_size: usize,
}

impl TsvLinkSource {
    pub fn new(paths: Vec<PathBuf>, batch_size: usize) -> Self {
        Self {
            paths,
            batch_size: batch_size.max(1),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl LinkSource for TsvLinkSource {
    fn batches(&self) -> LinkRankResult<PairBatches<'_>> {
        Ok(Box::new(TsvBatches {
            paths: self.paths.iter(),
            lines: None,
            batch_size: self.batch_size,
        }))
    }
}

pub fn parse_tsv_line(line: &str) -> Option<TitlePair> {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return None;
    }
    match line.split_once('\t') {
        Some((title, _)) if title.is_empty() => None,
        Some((title, link)) if link.is_empty() => Some(TitlePair::page(title)),
        Some((title, link)) => Some(TitlePair::new(title, link)),
        None => Some(TitlePair::page(line)),
    }
}

struct TsvBatches<'a> {
    paths: std::slice::Iter<'a, PathBuf>,
    lines: Option<std::io::Lines<BufReader<File>>>,
    batch_size: usize,
}

impl Iterator for TsvBatches<'_> {
    type Item = LinkRankResult<Vec<TitlePair>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.lines.is_none() {
                let path = self.paths.next()?;
                match File::open(path) {
                    Ok(file) => self.lines = Some(BufReader::new(file).lines()),
                    Err(e) => return Some(Err(e.into())),
                }
            }
            let lines = self.lines.as_mut()?;

            let mut batch = Vec::with_capacity(self.batch_size.min(4096));
            let mut exhausted = false;
            while batch.len() < self.batch_size {
                match lines.next() {
                    Some(Ok(line)) => batch.extend(parse_tsv_line(&line)),
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if exhausted {
                self.lines = None;
            }
            if !batch.is_empty() {
                return Some(Ok(batch));
            }
        }
    }
}

fn in_pool<T: Send>(workers: usize, job: impl FnOnce() -> T + Send) -> T {
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
    {
        Ok(pool) => pool.install(job),
        Err(_) => job(),
    }
}

/// Stage 1: distinct page titles → persisted [`TitleIndex`]. Returns the
/// index and the number of rows observed.
pub fn build_title_index(
    source: &dyn LinkSource,
    store: &Path,
) -> LinkRankResult<(TitleIndex, u64)> {
    if store.exists() {
        fs::remove_file(store)?;
    }
    let mut collector = SqliteTitleCollector::open(store)?;
    for batch in source.batches()? {
        collector.observe_batch(&batch?)?;
    }
    let observed = collector.observed();
    let index = collector.finish()?;
    if index.is_empty() {
        return Err(LinkRankError::EmptyGraph);
    }
    Ok((index, observed))
}

/// Stage 2: title pairs → partitioned id-pair dataset, one partition per batch.
pub fn encode_links(
    source: &dyn LinkSource,
    index: &TitleIndex,
    edges_dir: &Path,
    build: &BuildConfig,
) -> LinkRankResult<(EdgeManifest, EncodeStats)> {
    let encoder = LinkEncoder::new(index);
    let writer = EdgeDatasetWriter::create(edges_dir, index)?;
    let batches = source.batches()?;

    let stats = in_pool(build.workers, || {
        batches
            .par_bridge()
            .map(|batch| -> LinkRankResult<EncodeStats> {
                let (encoded, stats) = encoder.encode_batch(&batch?)?;
                writer.write_batch(&encoded)?;
                Ok(stats)
            })
            .try_reduce(EncodeStats::default, |mut a, b| {
                a.absorb(b);
                Ok(a)
            })
    })?;

    let manifest = writer.finish()?;
    info!(
        rows = stats.rows,
        resolved = stats.resolved,
        unresolved = stats.unresolved,
        linkless = stats.linkless,
        partitions = manifest.partitions.len(),
        "links encoded"
    );
    Ok((manifest, stats))
}

/// Stage 3: encoded dataset → persisted adjacency matrix.
pub fn build_adjacency(
    edges_dir: &Path,
    index: &TitleIndex,
    matrix_path: &Path,
    build: &BuildConfig,
) -> LinkRankResult<(AdjacencyMatrix, AdjacencyStats)> {
    let dataset = EdgeDataset::open_for(edges_dir, index)?;
    let (matrix, stats) = build_parallel(
        dataset.node_count(),
        dataset.partition_count(),
        build.workers,
        |p| dataset.read_partition(p),
    )?;
    save_adjacency(matrix_path, &matrix)?;
    info!(
        nodes = matrix.node_count(),
        nnz = matrix.nnz(),
        weight = matrix.total_weight(),
        discarded = stats.discarded,
        "adjacency matrix built"
    );
    Ok((matrix, stats))
}

/// Stage 4: power iteration plus the ranking table and score dumps in `workdir`.
/// The returned recorder holds the per-iteration top-K history.
pub fn rank_pages(
    adjacency: &AdjacencyMatrix,
    index: &TitleIndex,
    workdir: &Path,
    config: &RankConfig,
    workers: usize,
) -> LinkRankResult<(RankOutcome, TopKRecorder)> {
    if adjacency.node_count() != index.len() {
        return Err(LinkRankError::ShapeMismatch {
            expected: index.len(),
            found: adjacency.node_count(),
        });
    }
    let engine = PageRankEngine::new(*config)?;
    let mut recorder = TopKRecorder::new(config.top_k);
    let outcome = in_pool(workers, || {
        engine.run_adjacency(adjacency, (TracingObserver::default(), &mut recorder))
    })?;
    if !outcome.converged {
        warn!(
            iterations = outcome.iterations,
            delta = outcome.final_delta,
            "scores are from the last iteration, not a converged fixed point"
        );
    }

    let mut table = BufWriter::new(File::create(workdir.join(RANKING_FILE))?);
    write_ranking_tsv(&mut table, index, &outcome.scores)?;
    let mut raw = BufWriter::new(File::create(workdir.join(SCORES_RAW_FILE))?);
    write_scores_raw(&mut raw, &outcome.scores)?;
    let mut npy = BufWriter::new(File::create(workdir.join(SCORES_NPY_FILE))?);
    write_scores_npy(&mut npy, &outcome.scores)?;
    debug!(dir = %workdir.display(), "ranking artifacts written");

    Ok((outcome, recorder))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub index_ms: u64,
    pub encode_ms: u64,
    pub adjacency_ms: u64,
    pub rank_ms: u64,
    pub total_ms: u64,
}

/// Summary of one end-to-end run, also written to `report.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineReport {
    pub node_count: usize,
    pub index_fingerprint: String,
    pub rows_observed: u64,
    pub encode: EncodeStats,
    pub partitions: usize,
    pub adjacency: AdjacencyStats,
    pub nnz: usize,
    pub total_weight: u64,
    pub state: RunState,
    pub converged: bool,
    pub iterations: usize,
    pub final_delta: f64,
    pub top_k_history: Vec<TopKSnapshot>,
    /// Every page that was ever in a top-K snapshot, ordered by final score.
    pub top_titles: Vec<RankedTitle>,
    pub timings: StageTimings,
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Run all four stages, writing every artifact into `workdir`.
pub fn run_pipeline(
    source: &dyn LinkSource,
    workdir: &Path,
    rank: &RankConfig,
    build: &BuildConfig,
) -> LinkRankResult<PipelineReport> {
    rank.validate()?;
    build.validate()?;
    fs::create_dir_all(workdir)?;
    let started = Instant::now();
    let mut timings = StageTimings::default();

    let stage = Instant::now();
    let (index, rows_observed) = build_title_index(source, &workdir.join(TITLES_DB))?;
    timings.index_ms = elapsed_ms(stage);
    info!(titles = index.len(), rows = rows_observed, "stage 1 done");

    let stage = Instant::now();
    let (manifest, encode) = encode_links(source, &index, &workdir.join(EDGES_DIR), build)?;
    timings.encode_ms = elapsed_ms(stage);

    let stage = Instant::now();
    let (adjacency, adjacency_stats) =
        build_adjacency(&workdir.join(EDGES_DIR), &index, &workdir.join(ADJACENCY_FILE), build)?;
    timings.adjacency_ms = elapsed_ms(stage);

    let stage = Instant::now();
    let (outcome, recorder) = rank_pages(&adjacency, &index, workdir, rank, build.workers)?;
    timings.rank_ms = elapsed_ms(stage);
    timings.total_ms = elapsed_ms(started);

    let top_titles = recorder
        .ordered_by_final_score(&outcome.scores)
        .into_iter()
        .map(|id| RankedTitle {
            title: index.title_of(id).to_string(),
            score: outcome.scores[id as usize],
        })
        .collect();

    let report = PipelineReport {
        node_count: index.len(),
        index_fingerprint: index.fingerprint().to_string(),
        rows_observed,
        encode,
        partitions: manifest.partitions.len(),
        adjacency: adjacency_stats,
        nnz: adjacency.nnz(),
        total_weight: adjacency.total_weight(),
        state: outcome.state,
        converged: outcome.converged,
        iterations: outcome.iterations,
        final_delta: outcome.final_delta,
        top_k_history: recorder.into_history(),
        top_titles,
        timings,
    };
    fs::write(workdir.join(REPORT_FILE), serde_json::to_vec_pretty(&report)?)?;
    info!(
        nodes = report.node_count,
        converged = report.converged,
        iterations = report.iterations,
        total_ms = timings.total_ms,
        "pipeline finished"
    );
    Ok(report)
}
