//! Lock-free metrics collection and periodic reporting
//!
//! Every counter is an atomic updated with Relaxed ordering. These are
//! statistical counters only and must never drive engine decisions.
//! `report()` is the only method that resets anything (the periodic
//! reading rate and the request latency histogram).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for HTTP request latency (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

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

#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].swap(0, Ordering::Relaxed))
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Upper bound of the bucket containing the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket reports 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector shared by the engine and its transports
pub struct Metrics {
    readings_ingested: AtomicU64,
    readings_ignored: AtomicU64,
    /// Accepted readings since last report (reset on report)
    readings_since_report: AtomicU64,
    sales_recorded: AtomicU64,
    sales_rejected: AtomicU64,
    thefts_flagged: AtomicU64,
    alerts_high: AtomicU64,
    alerts_medium: AtomicU64,
    status_polls: AtomicU64,
    theft_sweeps: AtomicU64,
    classifier_requests: AtomicU64,
    classifier_failures: AtomicU64,
    /// Malformed serial/MQTT frames
    frames_rejected: AtomicU64,
    http_requests: AtomicU64,
    /// Request latency histogram (reset on report)
    request_latency_buckets: [AtomicU64; NUM_BUCKETS],
    request_latency_sum_us: AtomicU64,
    request_latency_max_us: AtomicU64,
    requests_since_report: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            readings_ingested: AtomicU64::new(0),
            readings_ignored: AtomicU64::new(0),
            readings_since_report: AtomicU64::new(0),
            sales_recorded: AtomicU64::new(0),
            sales_rejected: AtomicU64::new(0),
            thefts_flagged: AtomicU64::new(0),
            alerts_high: AtomicU64::new(0),
            alerts_medium: AtomicU64::new(0),
            status_polls: AtomicU64::new(0),
            theft_sweeps: AtomicU64::new(0),
            classifier_requests: AtomicU64::new(0),
            classifier_failures: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            http_requests: AtomicU64::new(0),
            request_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            request_latency_sum_us: AtomicU64::new(0),
            request_latency_max_us: AtomicU64::new(0),
            requests_since_report: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_reading(&self, accepted: bool) {
        if accepted {
            self.readings_ingested.fetch_add(1, Ordering::Relaxed);
            self.readings_since_report.fetch_add(1, Ordering::Relaxed);
        } else {
            self.readings_ignored.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_sale(&self, accepted: bool) {
        if accepted {
            self.sales_recorded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sales_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_thefts_flagged(&self, count: u64) {
        self.thefts_flagged.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert(&self, severity: crate::domain::Severity) {
        match severity {
            crate::domain::Severity::High => self.alerts_high.fetch_add(1, Ordering::Relaxed),
            crate::domain::Severity::Medium => self.alerts_medium.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_status_poll(&self) {
        self.status_polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_theft_sweep(&self) {
        self.theft_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_classifier_request(&self, ok: bool) {
        self.classifier_requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.classifier_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one served HTTP request and its handling latency
    #[inline]
    pub fn record_request(&self, latency_us: u64) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
        self.requests_since_report.fetch_add(1, Ordering::Relaxed);
        self.request_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.request_latency_max_us, latency_us);
        self.request_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn readings_ingested(&self) -> u64 {
        self.readings_ingested.load(Ordering::Relaxed)
    }

    pub fn readings_ignored(&self) -> u64 {
        self.readings_ignored.load(Ordering::Relaxed)
    }

    pub fn sales_recorded(&self) -> u64 {
        self.sales_recorded.load(Ordering::Relaxed)
    }

    pub fn sales_rejected(&self) -> u64 {
        self.sales_rejected.load(Ordering::Relaxed)
    }

    pub fn thefts_flagged(&self) -> u64 {
        self.thefts_flagged.load(Ordering::Relaxed)
    }

    pub fn alerts_high(&self) -> u64 {
        self.alerts_high.load(Ordering::Relaxed)
    }

    pub fn alerts_medium(&self) -> u64 {
        self.alerts_medium.load(Ordering::Relaxed)
    }

    pub fn status_polls(&self) -> u64 {
        self.status_polls.load(Ordering::Relaxed)
    }

    pub fn theft_sweeps(&self) -> u64 {
        self.theft_sweeps.load(Ordering::Relaxed)
    }

    pub fn classifier_requests(&self) -> u64 {
        self.classifier_requests.load(Ordering::Relaxed)
    }

    pub fn classifier_failures(&self) -> u64 {
        self.classifier_failures.load(Ordering::Relaxed)
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected.load(Ordering::Relaxed)
    }

    pub fn http_requests(&self) -> u64 {
        self.http_requests.load(Ordering::Relaxed)
    }

    /// Current latency histogram without resetting it (Prometheus scrape)
    pub fn request_latency_buckets(&self) -> [u64; NUM_BUCKETS] {
        load_buckets(&self.request_latency_buckets)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// `pending_sales` and `flagged_thefts` are gauges owned by the engine.
    pub fn report(&self, pending_sales: usize, flagged_thefts: usize) -> MetricsSummary {
        let readings_count = self.readings_since_report.swap(0, Ordering::Relaxed);
        let request_count = self.requests_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.request_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.request_latency_max_us.swap(0, Ordering::Relaxed);
        let latency_buckets = swap_buckets(&self.request_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let readings_per_sec = if elapsed.as_secs_f64() > 0.0 {
            readings_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_request_latency_us = if request_count > 0 { latency_sum / request_count } else { 0 };

        MetricsSummary {
            readings_ingested: self.readings_ingested(),
            readings_ignored: self.readings_ignored(),
            readings_per_sec,
            sales_recorded: self.sales_recorded(),
            sales_rejected: self.sales_rejected(),
            thefts_flagged: self.thefts_flagged(),
            alerts_high: self.alerts_high(),
            alerts_medium: self.alerts_medium(),
            status_polls: self.status_polls(),
            theft_sweeps: self.theft_sweeps(),
            classifier_requests: self.classifier_requests(),
            classifier_failures: self.classifier_failures(),
            frames_rejected: self.frames_rejected(),
            requests: request_count,
            avg_request_latency_us,
            max_request_latency_us: latency_max,
            request_p99_us: percentile_from_buckets(&latency_buckets, 0.99),
            pending_sales,
            flagged_thefts,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub readings_ingested: u64,
    pub readings_ignored: u64,
    pub readings_per_sec: f64,
    pub sales_recorded: u64,
    pub sales_rejected: u64,
    pub thefts_flagged: u64,
    pub alerts_high: u64,
    pub alerts_medium: u64,
    pub status_polls: u64,
    pub theft_sweeps: u64,
    pub classifier_requests: u64,
    pub classifier_failures: u64,
    pub frames_rejected: u64,
    /// Requests served since last report
    pub requests: u64,
    pub avg_request_latency_us: u64,
    pub max_request_latency_us: u64,
    pub request_p99_us: u64,
    pub pending_sales: usize,
    pub flagged_thefts: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            readings = %self.readings_ingested,
            readings_ignored = %self.readings_ignored,
            readings_per_sec = format!("{:.1}", self.readings_per_sec),
            sales = %self.sales_recorded,
            sales_rejected = %self.sales_rejected,
            pending_sales = %self.pending_sales,
            thefts = %self.flagged_thefts,
            alerts_high = %self.alerts_high,
            alerts_medium = %self.alerts_medium,
            requests = %self.requests,
            req_avg_us = %self.avg_request_latency_us,
            req_p99_us = %self.request_p99_us,
            "metrics"
        );
    }
}
