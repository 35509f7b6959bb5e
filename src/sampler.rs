use crate::level::LogLevel;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Probabilistic volume control for noisy levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Probability in `[0, 1]` that a record at a sampled level is kept.
    pub rate: f64,
    /// Levels subject to sampling. Every other level is always kept.
    pub levels: Vec<LogLevel>,
    /// Fixed seed for reproducible decisions, mostly for tests.
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            rate: 1.0,
            levels: vec![LogLevel::Trace, LogLevel::Debug],
            seed: None,
        }
    }
}

/// Decides, once per record and before any other work, whether it is
/// emitted at all.
#[derive(Debug)]
pub struct Sampler {
    rate: f64,
    levels: HashSet<LogLevel>,
    rng: Mutex<StdRng>,
    sampled_out: AtomicU64,
}

impl Sampler {
    pub fn new(config: &SamplingConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Sampler {
            rate: config.rate.clamp(0.0, 1.0),
            levels: config.levels.iter().copied().collect(),
            rng: Mutex::new(rng),
            sampled_out: AtomicU64::new(0),
        }
    }

    pub fn should_emit(&self, level: LogLevel) -> bool {
        if !self.levels.contains(&level) || self.rate >= 1.0 {
            return true;
        }
        let keep = self.rate > 0.0 && self.rng.lock().random::<f64>() < self.rate;
        if !keep {
            self.sampled_out.fetch_add(1, Ordering::Relaxed);
        }
        keep
    }

    /// Records suppressed so far.
    pub fn sampled_out(&self) -> u64 {
        self.sampled_out.load(Ordering::Relaxed)
    }
}
