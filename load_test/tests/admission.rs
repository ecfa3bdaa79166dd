//! Admission Gate Tests
//!
//! Ceiling and release-exactly-once properties of the admission gate, both
//! on its own and driven through the execution step against a faulty
//! backend.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use load_test::{AbortSignal, AdmissionGate, ExecutionStep, OutcomeStatus, RequestFactory};
use proptest::prelude::*;
use surge_client::{ConnectOptions, Connector};
use surge_core::PayloadTemplate;
use surge_testsuite::{Fault, SimulatedBackend};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn outstanding_tokens_never_exceed_ceiling(
        ceiling in 1usize..12,
        holds in prop::collection::vec(0u8..4, 1..64),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (peak, acquired, released) = runtime.block_on(async {
            let gate = AdmissionGate::new(NonZeroUsize::new(ceiling).unwrap());
            let holding = Arc::new(AtomicUsize::new(0));
            let observed_peak = Arc::new(AtomicUsize::new(0));

            let tasks: Vec<_> = holds
                .iter()
                .map(|&yields| {
                    let gate = gate.clone();
                    let holding = holding.clone();
                    let observed_peak = observed_peak.clone();
                    tokio::spawn(async move {
                        let token = gate.acquire().await.unwrap();
                        let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
                        observed_peak.fetch_max(now, Ordering::SeqCst);
                        for _ in 0..yields {
                            tokio::task::yield_now().await;
                        }
                        holding.fetch_sub(1, Ordering::SeqCst);
                        token.release();
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            prop_assert_eq!(gate.in_flight(), 0);
            prop_assert!(gate.peak_in_flight() <= ceiling);
            Ok((
                observed_peak.load(Ordering::SeqCst),
                gate.acquired(),
                gate.released(),
            ))
        })?;

        prop_assert!(peak <= ceiling);
        prop_assert_eq!(acquired, holds.len() as u64);
        prop_assert_eq!(acquired, released);
    }
}

async fn step_with(script: Vec<Fault>, ceiling: usize) -> (Arc<ExecutionStep>, AbortSignal) {
    let backend = SimulatedBackend::builder()
        .latency(Duration::from_millis(5))
        .script(script)
        .build();
    let session = backend.open(&ConnectOptions::default()).await.unwrap();
    let abort = AbortSignal::new();
    let step = ExecutionStep::new(
        AdmissionGate::new(NonZeroUsize::new(ceiling).unwrap()),
        session,
        Duration::from_millis(200),
        Duration::from_millis(50),
        abort.clone(),
    );
    (Arc::new(step), abort)
}

#[tokio::test(start_paused = true)]
async fn test_every_failure_path_releases_once() {
    let script = vec![
        Fault::Ok,
        Fault::Overload,
        Fault::Timeout,
        Fault::Transient,
        Fault::Fatal,
        Fault::Hang,
        Fault::Panic,
    ];
    let (step, abort) = step_with(script, 2).await;
    let requests = RequestFactory::new("fi-", &PayloadTemplate::default());

    let runs = (0..7).map(|_| {
        let step = step.clone();
        let request = requests.next_request();
        tokio::spawn(async move { step.run(request).await.status() })
    });
    let mut statuses = Vec::new();
    for run in runs.collect::<Vec<_>>() {
        statuses.push(run.await.unwrap());
    }

    let count = |status| statuses.iter().filter(|s| **s == status).count();
    assert_eq!(count(OutcomeStatus::Ok), 1);
    assert_eq!(count(OutcomeStatus::Overload), 1);
    assert_eq!(count(OutcomeStatus::Timeout), 2, "backend timeout and hang");
    assert_eq!(count(OutcomeStatus::Error), 3, "transient, fatal and panic");
    assert!(abort.is_triggered());

    let gate = step.gate();
    assert_eq!(gate.acquired(), 7);
    assert_eq!(gate.released(), 7);
    assert_eq!(gate.in_flight(), 0);
    assert!(gate.peak_in_flight() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_operation_releases_token() {
    let (step, _) = step_with(vec![Fault::Hang], 1).await;
    let requests = RequestFactory::new("cancel-", &PayloadTemplate::default());

    let running = {
        let step = step.clone();
        let request = requests.next_request();
        tokio::spawn(async move { step.run(request).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(step.gate().in_flight(), 1);

    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());
    assert_eq!(step.gate().in_flight(), 0);
    assert_eq!(step.gate().acquired(), step.gate().released());

    // Capacity is usable again
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        step.run(requests.next_request()),
    )
    .await
    .unwrap();
    assert_eq!(outcome.status(), OutcomeStatus::Timeout);
}
