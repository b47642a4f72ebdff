pub mod engine;
pub mod observer;
pub mod output;
pub mod topk;

pub use engine::{PageRankEngine, RankOutcome, RunState};
pub use observer::{IterationEvent, IterationObserver, NoopObserver, TracingObserver};
pub use topk::{top_k, TopKRecorder, TopKSnapshot};
