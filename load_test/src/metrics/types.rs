//! Metric types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::outcome::OutcomeStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub ok: u64,
    pub overload: u64,
    pub timeout: u64,
    pub error: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: OutcomeStatus) {
        match status {
            OutcomeStatus::Ok => self.ok += 1,
            OutcomeStatus::Overload => self.overload += 1,
            OutcomeStatus::Timeout => self.timeout += 1,
            OutcomeStatus::Error => self.error += 1,
        }
    }

    pub fn get(&self, status: OutcomeStatus) -> u64 {
        match status {
            OutcomeStatus::Ok => self.ok,
            OutcomeStatus::Overload => self.overload,
            OutcomeStatus::Timeout => self.timeout,
            OutcomeStatus::Error => self.error,
        }
    }

    pub fn total(&self) -> u64 {
        self.ok + self.overload + self.timeout + self.error
    }

    pub fn failed(&self) -> u64 {
        self.total() - self.ok
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub cpu_usage: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
}

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    pub mean: f64,
    pub count: u64,
}

/// Point-in-time or end-of-run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Operations handed to the execution step
    pub started: u64,
    /// Started operations with no outcome yet
    pub in_flight: u64,
    /// Operations cancelled at the end of the drain grace period
    pub abandoned: u64,
    pub counts: StatusCounts,
    pub total: u64,
    pub latency: LatencyStats,
    pub ok_latency: LatencyStats,
    pub admission_wait: LatencyStats,
    pub bytes_written: u64,
    /// Outcomes per second
    pub throughput: f64,
    /// Successful writes per second
    pub ok_throughput: f64,
    pub peak_in_flight: usize,
    pub system: SystemMetrics,
}

impl RunReport {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.counts.ok as f64 / self.total as f64 * 100.0
        }
    }
}
