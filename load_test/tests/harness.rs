//! Harness End-to-End Tests
//!
//! Full runs against the simulated backend on a paused clock, so schedules
//! of several seconds finish instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use load_test::config::RetryConfig;
use load_test::{Harness, HarnessConfig, HarnessError, JsonLinesSink, Phase, Schedule};
use surge_testsuite::{Fault, SimulatedBackend};

/// Helper: config with no settle delay and fast retries
fn config(phases: Vec<Phase>, ceiling: usize) -> HarnessConfig {
    HarnessConfig {
        max_in_flight: ceiling,
        settle_delay: Duration::ZERO,
        drain_grace: Duration::from_secs(5),
        seed: Some(7),
        schedule: Schedule::new(phases).unwrap(),
        retry: RetryConfig {
            initial_interval: Duration::from_millis(100),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(1),
            maximum_attempts: 3,
        },
        ..HarnessConfig::default()
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test(start_paused = true)]
async fn test_closed_loop_run_respects_ceiling() {
    let backend = SimulatedBackend::with_latency(Duration::from_millis(10));
    let config = config(
        vec![Phase::ramp(10, secs(2)), Phase::constant(10, secs(3))],
        5,
    );

    let report = Harness::new(config, Arc::new(backend.clone()))
        .unwrap()
        .run()
        .await
        .expect("run succeeds");

    assert!(report.total > 0);
    assert_eq!(report.counts.ok, report.total, "every write succeeds");
    assert_eq!(report.started, report.total);
    assert_eq!(report.abandoned, 0);
    // Five slots of 10ms each over five seconds, less the ramp-up
    assert!(report.total <= 2500, "total {} above ceiling throughput", report.total);
    assert!(report.total >= 1800, "total {} well below ceiling throughput", report.total);
    assert!(report.peak_in_flight <= 5);

    let stats = backend.stats();
    assert!(stats.peak_concurrent_writes <= 5);
    assert_eq!(stats.writes_succeeded, report.counts.ok);
    assert_eq!(stats.distinct_keys as u64, report.total);
    assert_eq!(stats.provisioned_targets, vec!["PerfTesting".to_string()]);
    assert_eq!(stats.sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_overloaded_half_is_classified() {
    let backend = SimulatedBackend::builder()
        .latency(Duration::from_millis(1))
        .overload_first(100)
        .build();
    let config = config(vec![Phase::inject(100, secs(2))], 200);

    let report = Harness::new(config, Arc::new(backend.clone()))
        .unwrap()
        .run()
        .await
        .expect("run succeeds");

    assert!(
        (190..=210).contains(&report.total),
        "injected {} operations",
        report.total
    );
    assert_eq!(report.counts.overload, 100);
    assert_eq!(report.counts.ok, report.total - 100);
    assert_eq!(report.counts.total(), report.started);
    assert_eq!(report.counts.timeout + report.counts.error, 0);
    assert_eq!(backend.stats().writes_attempted, report.total);
}

#[tokio::test(start_paused = true)]
async fn test_setup_failure_starts_no_work() {
    let backend = SimulatedBackend::builder().fail_open(10).build();
    let config = config(vec![Phase::constant(4, secs(1))], 4);

    let err = Harness::new(config, Arc::new(backend.clone()))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Setup(_)));
    assert!(err.report().is_none());
    let stats = backend.stats();
    assert_eq!(stats.sessions_opened, 0);
    assert_eq!(stats.writes_attempted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_setup_retries_transient_open_failures() {
    let backend = SimulatedBackend::builder().fail_open(2).build();
    let config = config(vec![Phase::inject(10, secs(1))], 4);

    let report = Harness::new(config, Arc::new(backend.clone()))
        .unwrap()
        .run()
        .await
        .expect("third attempt connects");
    assert_eq!(backend.stats().sessions_opened, 1);
    assert_eq!(report.counts.ok, report.total);
}

#[tokio::test(start_paused = true)]
async fn test_failed_provisioning_closes_session() {
    let backend = SimulatedBackend::builder().fail_provision(10).build();
    let config = config(vec![Phase::constant(4, secs(1))], 4);

    let err = Harness::new(config, Arc::new(backend.clone()))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Setup(_)));
    let stats = backend.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.writes_attempted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_aborts_and_tears_down() {
    let backend = SimulatedBackend::builder()
        .latency(Duration::from_millis(5))
        .script(vec![Fault::Ok, Fault::Ok, Fault::Ok, Fault::Fatal])
        .build();
    let config = config(vec![Phase::constant(4, secs(10))], 4);

    let err = Harness::new(config, Arc::new(backend.clone()))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    let (cause, report) = match err {
        HarnessError::Aborted { cause, report } => (cause, report),
        other => panic!("expected abort, got {:?}", other),
    };
    assert!(cause.contains("connection lost"), "cause: {}", cause);
    assert!(report.counts.error >= 1);
    assert_eq!(report.started, report.total + report.abandoned);
    assert!(report.elapsed_secs < 10.0);
    assert_eq!(backend.stats().sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_external_abort_stops_running() {
    let backend = SimulatedBackend::with_latency(Duration::from_millis(10));
    let config = config(vec![Phase::constant(3, secs(60))], 3);

    let harness = Harness::new(config, Arc::new(backend.clone())).unwrap();
    let abort = harness.abort_signal();
    tokio::spawn(async move {
        tokio::time::sleep(secs(2)).await;
        abort.trigger("interrupted");
    });

    let err = harness.run().await.unwrap_err();
    assert!(matches!(err, HarnessError::Aborted { ref cause, .. } if cause == "interrupted"));
    let report = err.report().unwrap();
    assert!(report.counts.ok > 0);
    assert!(report.elapsed_secs < 60.0);
    assert_eq!(backend.stats().sessions_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_during_settle_skips_running() {
    let backend = SimulatedBackend::with_latency(Duration::from_millis(10));
    let mut config = config(vec![Phase::constant(3, secs(60))], 3);
    config.settle_delay = secs(5);

    let harness = Harness::new(config, Arc::new(backend.clone())).unwrap();
    let abort = harness.abort_signal();
    tokio::spawn(async move {
        tokio::time::sleep(secs(1)).await;
        abort.trigger("interrupted");
    });

    let started = tokio::time::Instant::now();
    let err = harness.run().await.unwrap_err();
    assert!(started.elapsed() < secs(5), "waited {:?}", started.elapsed());
    assert!(matches!(err, HarnessError::Aborted { ref cause, .. } if cause == "interrupted"));
    assert_eq!(err.report().unwrap().total, 0);

    let stats = backend.stats();
    assert_eq!(stats.sessions_opened, 1);
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.writes_attempted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abort_during_open_retries_stops_setup() {
    let backend = SimulatedBackend::builder().fail_open(10).build();
    let mut config = config(vec![Phase::constant(3, secs(60))], 3);
    config.retry = RetryConfig {
        initial_interval: secs(10),
        backoff_coefficient: 2.0,
        maximum_interval: secs(60),
        maximum_attempts: 10,
    };

    let harness = Harness::new(config, Arc::new(backend.clone())).unwrap();
    let abort = harness.abort_signal();
    tokio::spawn(async move {
        tokio::time::sleep(secs(1)).await;
        abort.trigger("interrupted");
    });

    let started = tokio::time::Instant::now();
    let err = harness.run().await.unwrap_err();
    assert!(started.elapsed() < secs(10), "waited {:?}", started.elapsed());
    assert!(matches!(err, HarnessError::Aborted { .. }));
    assert_eq!(backend.stats().sessions_opened, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drain_grace_abandons_stuck_operations() {
    let backend = SimulatedBackend::builder().script(vec![Fault::Hang]).build();
    let mut config = config(vec![Phase::constant(3, secs(1))], 3);
    config.operation_timeout = secs(30);
    config.drain_grace = Duration::from_millis(200);

    let report = Harness::new(config, Arc::new(backend))
        .unwrap()
        .run()
        .await
        .expect("abandonment is not an error");

    assert_eq!(report.total, 0);
    assert_eq!(report.abandoned, 3);
    assert_eq!(report.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_failure_is_reported() {
    let backend = SimulatedBackend::builder().fail_close().build();
    let config = config(vec![Phase::inject(5, secs(1))], 2);

    let err = Harness::new(config, Arc::new(backend))
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Teardown { .. }));
    assert_eq!(err.report().unwrap().counts.ok, 5);
}

#[tokio::test(start_paused = true)]
async fn test_outcome_sink_sees_every_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outcomes.jsonl");
    let backend = SimulatedBackend::builder()
        .latency(Duration::from_millis(2))
        .script(vec![Fault::Ok, Fault::Transient])
        .build();
    let config = config(vec![Phase::inject(20, secs(1))], 8);

    let report = Harness::new(config, Arc::new(backend))
        .unwrap()
        .with_sink(Arc::new(JsonLinesSink::create(&path).unwrap()))
        .run()
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count() as u64, report.total);
    assert_eq!(report.counts.ok, 10);
    assert_eq!(report.counts.error, 10);
}

#[test]
fn test_zero_ceiling_is_rejected() {
    let mut config = config(vec![Phase::constant(1, secs(1))], 1);
    config.max_in_flight = 0;
    let result = Harness::new(config, Arc::new(SimulatedBackend::with_latency(Duration::ZERO)));
    assert!(matches!(result, Err(HarnessError::Config(_))));
}
