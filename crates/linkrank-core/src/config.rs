//! Run configuration: defaults, environment overrides, and validation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{LinkRankError, LinkRankResult};

pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_THRESHOLD: f64 = 1.0e-7;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_TOP_K: usize = 10;
/// Snapshots hold at most this many pages.
pub const MAX_TOP_K: usize = 10;
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

pub const ENV_DAMPING: &str = "LINKRANK_DAMPING";
pub const ENV_THRESHOLD: &str = "LINKRANK_THRESHOLD";
pub const ENV_MAX_ITERATIONS: &str = "LINKRANK_MAX_ITERATIONS";
pub const ENV_TOP_K: &str = "LINKRANK_TOP_K";
pub const ENV_BATCH_SIZE: &str = "LINKRANK_BATCH_SIZE";
pub const ENV_WORKERS: &str = "LINKRANK_WORKERS";

/// Parameters of the power iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankConfig {
    /// Probability mass that follows links each iteration.
    pub damping: f64,
    /// Per-node convergence threshold; the L1 delta is compared to `N * threshold`.
    pub threshold: f64,
    pub max_iterations: usize,
    /// Length of the per-iteration top-K snapshot.
    pub top_k: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            threshold: DEFAULT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RankConfig {
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Defaults overridden by `LINKRANK_*` environment variables, validated.
    pub fn from_env() -> LinkRankResult<Self> {
        let mut config = Self::default();
        if let Some(v) = env_override(ENV_DAMPING)? {
            config.damping = v;
        }
        if let Some(v) = env_override(ENV_THRESHOLD)? {
            config.threshold = v;
        }
        if let Some(v) = env_override(ENV_MAX_ITERATIONS)? {
            config.max_iterations = v;
        }
        if let Some(v) = env_override(ENV_TOP_K)? {
            config.top_k = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LinkRankResult<()> {
        if !self.damping.is_finite() || self.damping <= 0.0 || self.damping >= 1.0 {
            return Err(LinkRankError::Config(format!(
                "damping must satisfy 0 < d < 1, got {}",
                self.damping
            )));
        }
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(LinkRankError::Config(format!(
                "threshold must be finite and > 0, got {}",
                self.threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(LinkRankError::Config(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(LinkRankError::Config(format!(
                "top_k must be in 1..={MAX_TOP_K}, got {}",
                self.top_k
            )));
        }
        Ok(())
    }
}

/// Parameters of the out-of-core build stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Rows per batch when reading an upstream source.
    pub batch_size: usize,
    /// Worker threads for encoding and adjacency accumulation.
    pub workers: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl BuildConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn from_env() -> LinkRankResult<Self> {
        let mut config = Self::default();
        if let Some(v) = env_override(ENV_BATCH_SIZE)? {
            config.batch_size = v;
        }
        if let Some(v) = env_override(ENV_WORKERS)? {
            config.workers = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LinkRankResult<()> {
        if self.batch_size == 0 {
            return Err(LinkRankError::Config("batch_size must be > 0".to_string()));
        }
        if self.workers == 0 {
            return Err(LinkRankError::Config("workers must be > 0".to_string()));
        }
        Ok(())
    }
}

fn env_override<T: FromStr>(key: &str) -> LinkRankResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed.parse::<T>().map(Some).map_err(|_| {
                LinkRankError::Config(format!("{key}: cannot parse {trimmed:?}"))
            })
        }
        Err(_) => Ok(None),
    }
}
