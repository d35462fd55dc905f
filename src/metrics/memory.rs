//! In-memory metrics sink, queried by tests and the demo.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::sink::{Labels, MetricsSink};

/// Everything recorded for one label set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    /// Last reported concurrency gauge value.
    pub concurrency: usize,
    /// Highest concurrency gauge value seen.
    pub peak_concurrency: usize,
    /// Aggregated message lag.
    pub lag: LagStats,
    /// Processed counter.
    pub processed: u64,
    /// Error counters by category.
    pub errors: HashMap<&'static str, u64>,
}

/// Running aggregate of recorded lags; constant size however many are recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LagStats {
    pub count: u64,
    pub sum: Duration,
    pub max: Duration,
    pub last: Duration,
}

impl LagStats {
    fn record(&mut self, lag: Duration) {
        self.count += 1;
        self.sum = self.sum.saturating_add(lag);
        self.max = self.max.max(lag);
        self.last = lag;
    }

    /// Mean lag, `None` before the first sample.
    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok().filter(|c| *c > 0)?;
        Some(self.sum / count)
    }
}

impl Series {
    /// Sum of every error counter.
    pub fn error_total(&self) -> u64 {
        self.errors.values().sum()
    }

    /// Error counter for one category.
    pub fn errors_of(&self, kind: &str) -> u64 {
        self.errors.get(kind).copied().unwrap_or(0)
    }
}

/// Metrics sink keeping every series in memory.
#[derive(Default)]
pub struct InMemoryMetrics {
    series: Mutex<HashMap<Labels, Series>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the series recorded for `labels` (empty if none).
    pub fn snapshot(&self, labels: &Labels) -> Series {
        self.lock().get(labels).cloned().unwrap_or_default()
    }

    /// Every label set seen so far.
    pub fn labels(&self) -> Vec<Labels> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Labels, Series>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_series(&self, labels: &Labels, f: impl FnOnce(&mut Series)) {
        let mut series = self.lock();
        f(series.entry(labels.clone()).or_default());
    }
}

impl MetricsSink for InMemoryMetrics {
    fn concurrency(&self, labels: &Labels, in_use: usize) {
        self.with_series(labels, |s| {
            s.concurrency = in_use;
            s.peak_concurrency = s.peak_concurrency.max(in_use);
        });
    }

    fn message_lag(&self, labels: &Labels, lag: Duration) {
        self.with_series(labels, |s| s.lag.record(lag));
    }

    fn processed_inc(&self, labels: &Labels) {
        self.with_series(labels, |s| s.processed += 1);
    }

    fn error_inc(&self, labels: &Labels, kind: &'static str) {
        self.with_series(labels, |s| *s.errors.entry(kind).or_insert(0) += 1);
    }
}
