//! Result aggregator - thread-safe outcome ingestion with latency tracking

use super::sink::OutcomeSink;
use super::types::{LatencyStats, RunReport, StatusCounts, SystemMetrics};
use crate::admission::AdmissionGate;
use crate::outcome::Outcome;
use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::Arc;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::time::Instant;

struct AggregateState {
    started_at: DateTime<Utc>,
    run_start: Instant,
    started: u64,
    abandoned: u64,
    counts: StatusCounts,
    bytes_written: u64,
    /// All outcomes, microseconds
    latency: Histogram<u64>,
    /// Ok outcomes only, microseconds
    ok_latency: Histogram<u64>,
    admission_wait: Histogram<u64>,
    system: SystemMetrics,
}

impl AggregateState {
    fn new() -> Self {
        // 3 significant digits, auto-resizing
        Self {
            started_at: Utc::now(),
            run_start: Instant::now(),
            started: 0,
            abandoned: 0,
            counts: StatusCounts::default(),
            bytes_written: 0,
            latency: Histogram::new(3).expect("Failed to create latency histogram"),
            ok_latency: Histogram::new(3).expect("Failed to create ok latency histogram"),
            admission_wait: Histogram::new(3).expect("Failed to create admission histogram"),
            system: SystemMetrics::default(),
        }
    }
}

/// Collects outcomes from every worker.
///
/// Clones share state. Every outcome is counted exactly once: ingestion
/// always takes the write lock.
#[derive(Clone)]
pub struct ResultAggregator {
    state: Arc<RwLock<AggregateState>>,
    sinks: Arc<RwLock<Vec<Arc<dyn OutcomeSink>>>>,
    gate: Option<AdmissionGate>,
    system: Arc<RwLock<Option<System>>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AggregateState::new())),
            sinks: Arc::new(RwLock::new(Vec::new())),
            gate: None,
            system: Arc::new(RwLock::new(None)),
        }
    }

    /// Report in-flight peaks from `gate`
    pub fn with_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Restart the clock that throughput and elapsed time are measured from
    pub fn begin_run(&self) {
        let mut state = self.state.write();
        state.started_at = Utc::now();
        state.run_start = Instant::now();
    }

    pub fn add_sink(&self, sink: Arc<dyn OutcomeSink>) {
        self.sinks.write().push(sink);
    }

    /// Count an operation handed to the execution step
    pub fn op_started(&self) {
        self.state.write().started += 1;
    }

    pub fn record(&self, outcome: Outcome) {
        {
            let mut state = self.state.write();
            state.counts.add(outcome.status());
            let latency_us = outcome.latency().as_micros() as u64;
            state.latency.saturating_record(latency_us);
            state
                .admission_wait
                .saturating_record(outcome.admission_wait().as_micros() as u64);
            if outcome.is_ok() {
                state.ok_latency.saturating_record(latency_us);
                state.bytes_written += outcome.size_bytes() as u64;
            }
        }

        for sink in self.sinks.read().iter() {
            sink.record(&outcome);
        }
    }

    /// Close the books: started operations with no outcome are abandoned
    pub fn mark_abandoned(&self) -> u64 {
        let mut state = self.state.write();
        let pending = state.started.saturating_sub(state.counts.total());
        state.abandoned = pending;
        pending
    }

    pub fn flush_sinks(&self) {
        for sink in self.sinks.read().iter() {
            if let Err(e) = sink.flush() {
                tracing::warn!("Failed to flush outcome sink: {}", e);
            }
        }
    }

    /// Update system metrics (CPU, memory)
    pub fn update_system_metrics(&self) {
        let mut system = self.system.write();
        let system = system.get_or_insert_with(|| {
            System::new_with_specifics(
                RefreshKind::new()
                    .with_cpu(CpuRefreshKind::everything())
                    .with_memory(MemoryRefreshKind::everything()),
            )
        });
        system.refresh_cpu_all();
        system.refresh_memory();

        let mut state = self.state.write();
        state.system = SystemMetrics {
            cpu_usage: system.global_cpu_usage(),
            memory_used_mb: system.used_memory() / 1024 / 1024,
            memory_total_mb: system.total_memory() / 1024 / 1024,
        };
    }

    pub fn snapshot(&self) -> RunReport {
        let state = self.state.read();
        let elapsed = state.run_start.elapsed().as_secs_f64();
        let total = state.counts.total();
        let per_sec = |n: u64| if elapsed > 0.0 { n as f64 / elapsed } else { 0.0 };

        RunReport {
            started_at: state.started_at,
            elapsed_secs: elapsed,
            started: state.started,
            in_flight: state
                .started
                .saturating_sub(total)
                .saturating_sub(state.abandoned),
            abandoned: state.abandoned,
            counts: state.counts,
            total,
            latency: latency_stats(&state.latency),
            ok_latency: latency_stats(&state.ok_latency),
            admission_wait: latency_stats(&state.admission_wait),
            bytes_written: state.bytes_written,
            throughput: per_sec(total),
            ok_throughput: per_sec(state.counts.ok),
            peak_in_flight: self.gate.as_ref().map_or(0, |g| g.peak_in_flight()),
            system: state.system,
        }
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn latency_stats(hist: &Histogram<u64>) -> LatencyStats {
    if hist.is_empty() {
        return LatencyStats::default();
    }
    let ms = |us: u64| us as f64 / 1000.0;
    LatencyStats {
        min: ms(hist.min()),
        p50: ms(hist.value_at_quantile(0.50)),
        p95: ms(hist.value_at_quantile(0.95)),
        p99: ms(hist.value_at_quantile(0.99)),
        max: ms(hist.max()),
        mean: hist.mean() / 1000.0,
        count: hist.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeStatus;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn outcome(status: OutcomeStatus, latency_ms: u64) -> Outcome {
        let outcome = Outcome::new(
            "k",
            status,
            Duration::from_millis(latency_ms),
            Duration::from_millis(1),
        );
        if status == OutcomeStatus::Ok {
            outcome.with_size(100)
        } else {
            outcome
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<OutcomeStatus>>);

    impl OutcomeSink for CollectingSink {
        fn record(&self, outcome: &Outcome) {
            self.0.lock().push(outcome.status());
        }
    }

    #[test]
    fn test_snapshot_counts_and_latency() {
        let aggregator = ResultAggregator::new();
        for latency in [10, 20, 30] {
            aggregator.op_started();
            aggregator.record(outcome(OutcomeStatus::Ok, latency));
        }
        aggregator.op_started();
        aggregator.record(outcome(OutcomeStatus::Timeout, 1000));
        aggregator.op_started();

        let report = aggregator.snapshot();
        assert_eq!(report.total, 4);
        assert_eq!(report.counts.ok, 3);
        assert_eq!(report.counts.timeout, 1);
        assert_eq!(report.started, 5);
        assert_eq!(report.in_flight, 1);
        assert_eq!(report.bytes_written, 300);
        assert_eq!(report.ok_latency.count, 3);
        assert_eq!(report.latency.count, 4);
        assert!((report.ok_latency.max - 30.0).abs() < 0.1);
        assert!(report.latency.max >= 999.0);
        assert_eq!(report.success_rate(), 75.0);
    }

    #[test]
    fn test_mark_abandoned() {
        let aggregator = ResultAggregator::new();
        for _ in 0..3 {
            aggregator.op_started();
        }
        aggregator.record(outcome(OutcomeStatus::Ok, 1));

        assert_eq!(aggregator.mark_abandoned(), 2);
        let report = aggregator.snapshot();
        assert_eq!(report.abandoned, 2);
        assert_eq!(report.in_flight, 0);
    }

    #[test]
    fn test_sinks_receive_every_outcome() {
        let aggregator = ResultAggregator::new();
        let sink = Arc::new(CollectingSink::default());
        aggregator.add_sink(sink.clone());

        aggregator.record(outcome(OutcomeStatus::Ok, 1));
        aggregator.record(outcome(OutcomeStatus::Error, 1));
        assert_eq!(
            *sink.0.lock(),
            vec![OutcomeStatus::Ok, OutcomeStatus::Error]
        );
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        let aggregator = ResultAggregator::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        aggregator.op_started();
                        aggregator.record(outcome(OutcomeStatus::Ok, i % 50));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let report = aggregator.snapshot();
        assert_eq!(report.total, 4000);
        assert_eq!(report.latency.count, 4000);
        assert_eq!(report.started, 4000);
    }
}
