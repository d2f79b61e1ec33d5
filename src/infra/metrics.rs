//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Reporting swaps the periodic counters to zero to get a consistent snapshot.
//! The lifetime latency histogram is never reset; scrapers read it through
//! `snapshot()` so they do not steal data from the periodic log report.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only; nothing may branch on them.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Run latency bucket boundaries (microseconds)
/// Buckets: ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, ≤25000, ≤50000, ≤100000, >100000
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Upper bound reported for the overflow bucket
const OVERFLOW_UPPER_BOUND: u64 = 200_000;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

/// Upper bound of the bucket containing the given percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return METRICS_BUCKET_BOUNDS.get(i).copied().unwrap_or(OVERFLOW_UPPER_BOUND);
        }
    }
    OVERFLOW_UPPER_BOUND
}

/// Lock-free metrics collector for proximity runs
pub struct Metrics {
    /// Successful runs (monotonic)
    runs_total: AtomicU64,
    /// Failed runs (monotonic)
    runs_failed_total: AtomicU64,
    /// Records that survived resolution (monotonic)
    records_resolved_total: AtomicU64,
    /// Intervals dropped as unresolved or invalid (monotonic)
    records_dropped_total: AtomicU64,
    /// Runs since last report (reset on report)
    runs_since_report: AtomicU64,
    /// Sum of run latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max run latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Run latency histogram (reset on report)
    latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Sum of run latencies since startup (monotonic)
    latency_sum_total_us: AtomicU64,
    /// Max run latency since startup (monotonic)
    latency_max_total_us: AtomicU64,
    /// Run latency histogram since startup (monotonic)
    latency_buckets_total: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Failed runs per error kind (monotonic)
    failures_by_kind: Mutex<FxHashMap<&'static str, u64>>,
    last_report_time: Mutex<Instant>,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_total: AtomicU64::new(0),
            runs_failed_total: AtomicU64::new(0),
            records_resolved_total: AtomicU64::new(0),
            records_dropped_total: AtomicU64::new(0),
            runs_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            latency_max_total_us: AtomicU64::new(0),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            failures_by_kind: Mutex::new(FxHashMap::default()),
            last_report_time: Mutex::new(Instant::now()),
            started_at: Instant::now(),
        }
    }

    /// Record a completed run
    #[inline]
    pub fn record_run(&self, latency_us: u64, resolved: usize, dropped: usize) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
        self.records_resolved_total.fetch_add(resolved as u64, Ordering::Relaxed);
        self.records_dropped_total.fetch_add(dropped as u64, Ordering::Relaxed);
        self.record_latency(latency_us);
    }

    /// Record a run that ended in a fatal error
    pub fn record_run_failed(&self, latency_us: u64, kind: &'static str) {
        self.runs_failed_total.fetch_add(1, Ordering::Relaxed);
        *self.failures_by_kind.lock().entry(kind).or_insert(0) += 1;
        self.record_latency(latency_us);
    }

    #[inline]
    fn record_latency(&self, latency_us: u64) {
        self.runs_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_total_us, latency_us);
    }

    #[inline]
    pub fn runs_total(&self) -> u64 {
        self.runs_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn runs_failed_total(&self) -> u64 {
        self.runs_failed_total.load(Ordering::Relaxed)
    }

    /// Failure counts sorted by kind
    pub fn failures_by_kind(&self) -> Vec<(&'static str, u64)> {
        let mut failures: Vec<_> =
            self.failures_by_kind.lock().iter().map(|(k, v)| (*k, *v)).collect();
        failures.sort_unstable();
        failures
    }

    /// Snapshot all counters, resetting the periodic ones
    pub fn report(&self) -> MetricsSummary {
        let runs_count = self.runs_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        self.summary(runs_count, latency_sum, max_latency, lat_buckets, elapsed.as_secs_f64())
    }

    /// Snapshot lifetime counters without resetting anything
    pub fn snapshot(&self) -> MetricsSummary {
        let lat_buckets: [u64; METRICS_NUM_BUCKETS] =
            std::array::from_fn(|i| self.latency_buckets_total[i].load(Ordering::Relaxed));
        self.summary(
            lat_buckets.iter().sum(),
            self.latency_sum_total_us.load(Ordering::Relaxed),
            self.latency_max_total_us.load(Ordering::Relaxed),
            lat_buckets,
            self.started_at.elapsed().as_secs_f64(),
        )
    }

    fn summary(
        &self,
        runs_count: u64,
        latency_sum: u64,
        max_latency: u64,
        lat_buckets: [u64; METRICS_NUM_BUCKETS],
        elapsed_secs: f64,
    ) -> MetricsSummary {
        let runs_per_sec = if elapsed_secs > 0.0 { runs_count as f64 / elapsed_secs } else { 0.0 };

        MetricsSummary {
            runs_total: self.runs_total.load(Ordering::Relaxed),
            runs_failed_total: self.runs_failed_total.load(Ordering::Relaxed),
            records_resolved_total: self.records_resolved_total.load(Ordering::Relaxed),
            records_dropped_total: self.records_dropped_total.load(Ordering::Relaxed),
            runs_per_sec,
            avg_latency_us: if runs_count > 0 { latency_sum / runs_count } else { 0 },
            max_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            failures_by_kind: self.failures_by_kind(),
        }
    }
}

/// Point-in-time view of the collected metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub runs_total: u64,
    pub runs_failed_total: u64,
    pub records_resolved_total: u64,
    pub records_dropped_total: u64,
    pub runs_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    pub failures_by_kind: Vec<(&'static str, u64)>,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            runs_total = %self.runs_total,
            runs_failed_total = %self.runs_failed_total,
            records_resolved_total = %self.records_resolved_total,
            records_dropped_total = %self.records_dropped_total,
            runs_per_sec = format!("{:.2}", self.runs_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            "metrics"
        );
    }
}
