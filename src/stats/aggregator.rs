// src/stats/aggregator.rs
//! Hash-rate aggregation
//!
//! Each worker keeps a short sliding window of its reported rates; the
//! worker's rate is the mean of that window and the total is the sum of
//! the means. The total is recomputed at most once per refresh interval
//! so that a flood of progress messages stays cheap.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// Default number of samples kept per worker
pub const DEFAULT_WINDOW: usize = 11;

/// Default minimum time between total recomputations
pub const DEFAULT_REFRESH: Duration = Duration::from_millis(250);

/// Sliding-window hash-rate estimator
#[derive(Debug, Clone)]
pub struct HashRateAggregator {
    window: usize,
    refresh_every: Duration,
    samples: BTreeMap<usize, VecDeque<f64>>,
    max_rates: BTreeMap<usize, f64>,
    total: f64,
    last_refresh: Option<Instant>,
}

impl Default for HashRateAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_REFRESH)
    }
}

impl HashRateAggregator {
    /// Creates an aggregator keeping `window` samples per worker
    pub fn new(window: usize, refresh_every: Duration) -> Self {
        HashRateAggregator {
            window: window.max(1),
            refresh_every,
            samples: BTreeMap::new(),
            max_rates: BTreeMap::new(),
            total: 0.0,
            last_refresh: None,
        }
    }

    /// Records one rate report from `worker`
    ///
    /// Missing and non-finite rates are ignored; negative rates count as
    /// zero.
    pub fn record_sample(&mut self, worker: usize, rate: Option<f64>) {
        self.record_sample_at(worker, rate, Instant::now());
    }

    fn record_sample_at(&mut self, worker: usize, rate: Option<f64>, now: Instant) {
        let Some(rate) = rate.filter(|r| r.is_finite()) else {
            return;
        };
        let rate = rate.max(0.0);

        let window = self.samples.entry(worker).or_default();
        window.push_back(rate);
        while window.len() > self.window {
            window.pop_front();
        }

        let max = self.max_rates.entry(worker).or_insert(rate);
        if rate > *max {
            *max = rate;
        }

        self.refresh(now);
    }

    fn refresh(&mut self, now: Instant) {
        if let Some(last) = self.last_refresh {
            if now.duration_since(last) < self.refresh_every {
                return;
            }
        }
        self.total = self.samples.values().map(|w| mean(w)).sum();
        self.last_refresh = Some(now);
    }

    /// Total hashes per second across all workers
    ///
    /// Returns the value from the last refresh; a refresh happens when the
    /// interval has elapsed.
    pub fn total_rate(&mut self) -> f64 {
        self.refresh(Instant::now());
        self.total
    }

    /// Current mean rate of one worker
    pub fn worker_rate(&self, worker: usize) -> f64 {
        self.samples.get(&worker).map_or(0.0, mean)
    }

    /// Highest rate each worker ever reported
    pub fn max_rates(&self) -> &BTreeMap<usize, f64> {
        &self.max_rates
    }

    /// Forgets workers with index `>= workers`
    pub fn retain_workers(&mut self, workers: usize) {
        self.samples.retain(|&w, _| w < workers);
        self.last_refresh = None;
    }

    /// Clears all samples
    pub fn reset(&mut self) {
        self.samples.clear();
        self.max_rates.clear();
        self.total = 0.0;
        self.last_refresh = None;
    }
}

fn mean(window: &VecDeque<f64>) -> f64 {
    if window.is_empty() {
        0.0
    } else {
        window.iter().sum::<f64>() / window.len() as f64
    }
}
