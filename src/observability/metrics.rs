// Execution metrics
//
// Counters for every terminal state plus a wall-time histogram. Owned by a
// sandbox instance; exported as a serde snapshot or Prometheus text.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::types::{ExecutionResult, ExecutionStatus};

/// Counter metric (monotonically increasing)
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket histogram of durations in milliseconds
#[derive(Debug)]
pub struct Histogram {
    bounds_ms: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_ms: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bounds_ms: &[u64]) -> Self {
        Self {
            bounds_ms: bounds_ms.to_vec(),
            buckets: bounds_ms.iter().map(|_| AtomicU64::new(0)).collect(),
            sum_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value_ms: u64) {
        for (bound, bucket) in self.bounds_ms.iter().zip(&self.buckets) {
            if value_ms <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum_ms(&self) -> u64 {
        self.sum_ms.load(Ordering::Relaxed)
    }

    /// Cumulative (bound, count) pairs
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        self.bounds_ms
            .iter()
            .zip(&self.buckets)
            .map(|(bound, bucket)| (*bound, bucket.load(Ordering::Relaxed)))
            .collect()
    }
}

const LATENCY_BOUNDS_MS: &[u64] = &[10, 50, 100, 250, 500, 1000, 2500, 5000, 10_000];

/// Per-sandbox metrics
#[derive(Debug)]
pub struct SandboxMetrics {
    pub accepted: Counter,
    pub rate_limited: Counter,
    pub completed: Counter,
    pub errored: Counter,
    pub timed_out: Counter,
    pub internal_errors: Counter,
    pub truncated: Counter,
    pub wall_time: Histogram,
}

impl Default for SandboxMetrics {
    fn default() -> Self {
        Self {
            accepted: Counter::default(),
            rate_limited: Counter::default(),
            completed: Counter::default(),
            errored: Counter::default(),
            timed_out: Counter::default(),
            internal_errors: Counter::default(),
            truncated: Counter::default(),
            wall_time: Histogram::new(LATENCY_BOUNDS_MS),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub accepted: u64,
    pub rate_limited: u64,
    pub completed: u64,
    pub errored: u64,
    pub timed_out: u64,
    pub internal_errors: u64,
    pub truncated: u64,
    pub wall_time_count: u64,
    pub wall_time_sum_ms: u64,
}

impl SandboxMetrics {
    /// Record the terminal state of one request
    pub fn record(&self, result: &ExecutionResult) {
        match result.status {
            ExecutionStatus::RateLimited => {
                self.rate_limited.inc();
                return;
            }
            ExecutionStatus::Completed => self.completed.inc(),
            ExecutionStatus::Errored => self.errored.inc(),
            ExecutionStatus::TimedOut => self.timed_out.inc(),
            ExecutionStatus::InternalError => self.internal_errors.inc(),
        }
        if result.truncated {
            self.truncated.inc();
        }
        self.wall_time.observe(result.wall_time_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.get(),
            rate_limited: self.rate_limited.get(),
            completed: self.completed.get(),
            errored: self.errored.get(),
            timed_out: self.timed_out.get(),
            internal_errors: self.internal_errors.get(),
            truncated: self.truncated.get(),
            wall_time_count: self.wall_time.count(),
            wall_time_sum_ms: self.wall_time.sum_ms(),
        }
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP patternbox_requests_total Execution requests by outcome");
        let _ = writeln!(out, "# TYPE patternbox_requests_total counter");
        for (outcome, counter) in [
            ("rate_limited", &self.rate_limited),
            ("completed", &self.completed),
            ("errored", &self.errored),
            ("timed_out", &self.timed_out),
            ("internal_error", &self.internal_errors),
        ] {
            let _ = writeln!(
                out,
                "patternbox_requests_total{{outcome=\"{}\"}} {}",
                outcome,
                counter.get()
            );
        }

        let _ = writeln!(out, "# TYPE patternbox_output_truncated_total counter");
        let _ = writeln!(out, "patternbox_output_truncated_total {}", self.truncated.get());

        let _ = writeln!(out, "# TYPE patternbox_wall_time_ms histogram");
        for (bound, count) in self.wall_time.buckets() {
            let _ = writeln!(out, "patternbox_wall_time_ms_bucket{{le=\"{}\"}} {}", bound, count);
        }
        let _ = writeln!(
            out,
            "patternbox_wall_time_ms_bucket{{le=\"+Inf\"}} {}",
            self.wall_time.count()
        );
        let _ = writeln!(out, "patternbox_wall_time_ms_sum {}", self.wall_time.sum_ms());
        let _ = writeln!(out, "patternbox_wall_time_ms_count {}", self.wall_time.count());

        out
    }
}
