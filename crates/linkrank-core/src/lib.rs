//! Linkrank core library: out-of-core PageRank over wiki link titles.
//!
//! The pipeline assigns dense ids to page titles, encodes `(title, link)`
//! pairs into id pairs, folds them into a sparse adjacency matrix and runs a
//! damped power iteration over it. Each stage persists its artifact so later
//! stages (and reruns) read from disk. With the `python` feature the crate is
//! also compiled as a Python extension module (`linkrank_core`) via PyO3.

pub mod config;
pub mod errors;
pub mod graph;
pub mod indexer;
pub mod models;
pub mod pipeline;
pub mod rank;
pub mod store;

#[cfg(feature = "python")]
pub mod python;

pub use config::{BuildConfig, RankConfig};
pub use errors::{LinkRankError, LinkRankResult};
pub use models::{TitleId, TitlePair, SENTINEL_ID};
pub use pipeline::{run_pipeline, LinkSource, MemoryLinkSource, PipelineReport, TsvLinkSource};
