//! Criterion benchmarks for linkrank-core.
//!
//! ## Benchmark groups
//!
//! 1. **title_index**: distinct collection + id assignment, in memory and via SQLite.
//! 2. **encoder**: title-pair → id-pair throughput.
//! 3. **adjacency**: per-batch fold and partial merge.
//! 4. **pagerank**: power iteration on synthetic graphs.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/linkrank-core/Cargo.toml
//! # Run only the pagerank group:
//! cargo bench --manifest-path crates/linkrank-core/Cargo.toml -- pagerank
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use linkrank_core::config::RankConfig;
use linkrank_core::graph::builder::{build_parallel, build_sequential};
use linkrank_core::graph::sparse::AdjacencyMatrix;
use linkrank_core::indexer::{LinkEncoder, TitleIndex, TitleIndexBuilder};
use linkrank_core::models::{EncodedBatch, TitlePair};
use linkrank_core::rank::{NoopObserver, PageRankEngine};
use linkrank_core::store::SqliteTitleCollector;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deterministic pseudo-random graph: every page links to `fanout` others,
/// and one link in ten points at a title that is not a page.
fn synthetic_pairs(pages: usize, fanout: usize) -> Vec<TitlePair> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut pairs = Vec::with_capacity(pages * fanout);
    for p in 0..pages {
        for _ in 0..fanout {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let target = (state % pages as u64) as usize;
            let link = if state % 10 == 0 {
                format!("Missing {target}")
            } else {
                format!("Page {target:07}")
            };
            pairs.push(TitlePair::new(format!("Page {p:07}"), link));
        }
    }
    pairs
}

fn encoded_batches(pairs: &[TitlePair], batch_size: usize) -> (TitleIndex, Vec<EncodedBatch>) {
    let mut builder = TitleIndexBuilder::new();
    builder.observe_pairs(pairs);
    let index = builder.finish();
    let encoder = LinkEncoder::new(&index);
    let batches = pairs
        .chunks(batch_size)
        .map(|chunk| encoder.encode_batch(chunk).unwrap().0)
        .collect();
    (index, batches)
}

// ---------------------------------------------------------------------------
// Benchmark: title index
// ---------------------------------------------------------------------------

fn bench_title_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("title_index");
    for &pages in &[1_000usize, 10_000] {
        let pairs = synthetic_pairs(pages, 8);
        group.bench_with_input(BenchmarkId::new("in_memory", pages), &pairs, |b, pairs| {
            b.iter(|| {
                let mut builder = TitleIndexBuilder::new();
                for chunk in pairs.chunks(4096) {
                    builder.observe_pairs(chunk);
                }
                black_box(builder.finish());
            });
        });
        group.bench_with_input(BenchmarkId::new("sqlite", pages), &pairs, |b, pairs| {
            b.iter_with_setup(
                || tempfile::tempdir().unwrap(),
                |dir| {
                    let mut collector =
                        SqliteTitleCollector::open(&dir.path().join("titles.sqlite")).unwrap();
                    for chunk in pairs.chunks(4096) {
                        collector.observe_batch(chunk).unwrap();
                    }
                    black_box(collector.finish().unwrap());
                },
            );
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: encoder
// ---------------------------------------------------------------------------

fn bench_encoder(c: &mut Criterion) {
    let pairs = synthetic_pairs(10_000, 8);
    let index = TitleIndex::from_titles(pairs.iter().map(|p| p.title.as_str()));
    let encoder = LinkEncoder::new(&index);
    c.bench_function("encoder/80k_rows", |b| {
        b.iter(|| {
            for chunk in pairs.chunks(8192) {
                black_box(encoder.encode_batch(chunk).unwrap());
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark: adjacency accumulation
// ---------------------------------------------------------------------------

fn bench_adjacency(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjacency");
    let pairs = synthetic_pairs(20_000, 10);
    let (index, batches) = encoded_batches(&pairs, 8192);
    let n = index.len();

    group.bench_function("sequential_fold", |b| {
        b.iter(|| black_box(build_sequential(n, batches.iter().cloned().map(Ok)).unwrap()));
    });
    group.bench_function("parallel_reduce", |b| {
        b.iter(|| {
            black_box(build_parallel(n, batches.len(), 4, |p| Ok(batches[p].clone())).unwrap())
        });
    });

    let halves: Vec<AdjacencyMatrix> = batches
        .chunks(batches.len().div_ceil(2))
        .map(|chunk| build_sequential(n, chunk.iter().cloned().map(Ok)).unwrap().0)
        .collect();
    group.bench_function("merge_two_partials", |b| {
        b.iter_with_setup(
            || (halves[0].clone(), halves[1].clone()),
            |(a, other)| black_box(a.merge(other).unwrap()),
        );
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: PageRank convergence on synthetic graphs
// ---------------------------------------------------------------------------

fn bench_pagerank(c: &mut Criterion) {
    let mut group = c.benchmark_group("pagerank");
    // Convergence can take many iterations, so allow longer measurement times.
    group.measurement_time(std::time::Duration::from_secs(10));
    let engine = PageRankEngine::new(RankConfig::default()).unwrap();

    for &pages in &[1_000usize, 10_000, 100_000] {
        let pairs = synthetic_pairs(pages, 8);
        let (index, batches) = encoded_batches(&pairs, 65_536);
        let (adjacency, _) =
            build_sequential(index.len(), batches.into_iter().map(Ok)).unwrap();
        group.bench_with_input(BenchmarkId::new("run", pages), &adjacency, |b, adjacency| {
            b.iter(|| black_box(engine.run_adjacency(adjacency, NoopObserver).unwrap()));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Register all benchmark groups
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_title_index,
    bench_encoder,
    bench_adjacency,
    bench_pagerank,
);
criterion_main!(benches);
