//! Execution step: admission, backend write, classification.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use surge_client::Session;
use surge_core::{ErrorKind, OperationRequest, PayloadTemplate};
use tokio::time::Instant;

use crate::abort::AbortSignal;
use crate::admission::AdmissionGate;
use crate::outcome::{Outcome, OutcomeStatus};

/// Builds the request for each invocation.
///
/// The payload is rendered once and shared by every request.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    prefix: Arc<str>,
    payload: Arc<[u8]>,
}

impl RequestFactory {
    pub fn new(prefix: &str, template: &PayloadTemplate) -> Self {
        Self {
            prefix: Arc::from(prefix),
            payload: template.render(),
        }
    }

    pub fn next_request(&self) -> OperationRequest {
        OperationRequest::generate(&self.prefix, self.payload.clone())
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// One write against the backend, bounded by the admission gate.
///
/// [`run`](Self::run) never fails: every path ends in exactly one
/// [`Outcome`], and the admission token is released on all of them.
pub struct ExecutionStep {
    gate: AdmissionGate,
    session: Arc<dyn Session>,
    timeout: Duration,
    overload_backoff: Duration,
    abort: AbortSignal,
}

impl ExecutionStep {
    pub fn new(
        gate: AdmissionGate,
        session: Arc<dyn Session>,
        timeout: Duration,
        overload_backoff: Duration,
        abort: AbortSignal,
    ) -> Self {
        Self {
            gate,
            session,
            timeout,
            overload_backoff,
            abort,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub async fn run(&self, request: OperationRequest) -> Outcome {
        let queued_at = Instant::now();
        let token = match self.gate.acquire().await {
            Ok(token) => token,
            Err(closed) => {
                return Outcome::new(
                    request.key(),
                    OutcomeStatus::Error,
                    Duration::ZERO,
                    queued_at.elapsed(),
                )
                .with_detail(closed.to_string());
            }
        };
        let admission_wait = queued_at.elapsed();

        let started = Instant::now();
        let write = AssertUnwindSafe(self.session.write(
            request.key(),
            request.payload(),
            self.timeout,
        ))
        .catch_unwind();
        let result = tokio::time::timeout(self.timeout, write).await;
        let latency = started.elapsed();

        let classify = |status| Outcome::new(request.key(), status, latency, admission_wait);

        let outcome = match result {
            Ok(Ok(Ok(()))) => {
                tracing::debug!("Write {} ok in {:?}", request.key(), latency);
                classify(OutcomeStatus::Ok).with_size(request.size())
            }
            Ok(Ok(Err(e))) => match e.kind() {
                ErrorKind::Overload => {
                    tracing::warn!(
                        "Write {} rejected as overloaded: {}. Backing off {:?}",
                        request.key(),
                        e,
                        self.overload_backoff
                    );
                    if !self.overload_backoff.is_zero() {
                        tokio::time::sleep(self.overload_backoff).await;
                    }
                    classify(OutcomeStatus::Overload).with_detail(e.to_string())
                }
                ErrorKind::Timeout => {
                    tracing::debug!("Write {} timed out: {}", request.key(), e);
                    classify(OutcomeStatus::Timeout).with_detail(e.to_string())
                }
                ErrorKind::Transient => {
                    tracing::error!("Write {} failed: {}", request.key(), e);
                    classify(OutcomeStatus::Error).with_detail(e.to_string())
                }
                ErrorKind::Fatal => {
                    tracing::error!("Write {} failed fatally: {}", request.key(), e);
                    self.abort.trigger(format!("fatal backend error: {}", e));
                    classify(OutcomeStatus::Error).with_detail(e.to_string())
                }
            },
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Write {} panicked: {}", request.key(), message);
                classify(OutcomeStatus::Error).with_detail(format!("backend panicked: {}", message))
            }
            Err(_) => {
                tracing::debug!(
                    "Write {} exceeded deadline of {:?}",
                    request.key(),
                    self.timeout
                );
                classify(OutcomeStatus::Timeout)
                    .with_detail(format!("deadline of {:?} elapsed", self.timeout))
            }
        };

        token.release();
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use surge_client::{ConnectOptions, Connector};
    use surge_testsuite::{Fault, SimulatedBackend};

    async fn step_for(backend: &SimulatedBackend, ceiling: usize) -> (ExecutionStep, AbortSignal) {
        let session = backend.open(&ConnectOptions::default()).await.unwrap();
        let abort = AbortSignal::new();
        let step = ExecutionStep::new(
            AdmissionGate::new(NonZeroUsize::new(ceiling).unwrap()),
            session,
            Duration::from_millis(1000),
            Duration::from_millis(100),
            abort.clone(),
        );
        (step, abort)
    }

    fn factory() -> RequestFactory {
        RequestFactory::new("perf-", &PayloadTemplate::Raw { size: 32 })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_records_size() {
        let backend = SimulatedBackend::with_latency(Duration::from_millis(10));
        let (step, _) = step_for(&backend, 1).await;

        let outcome = step.run(factory().next_request()).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.size_bytes(), 32);
        assert!(outcome.latency() >= Duration::from_millis(10));
        assert!(outcome.key().starts_with("perf-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_holds_token_during_backoff() {
        let backend = SimulatedBackend::builder().overload_first(1).build();
        let (step, _) = step_for(&backend, 1).await;
        let step = Arc::new(step);

        let first = {
            let step = step.clone();
            tokio::spawn(async move { step.run(factory().next_request()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(step.gate().in_flight(), 1, "token held while backing off");

        let outcome = first.await.unwrap();
        assert_eq!(outcome.status(), OutcomeStatus::Overload);
        assert_eq!(step.gate().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_write_times_out() {
        let backend = SimulatedBackend::builder().script(vec![Fault::Hang]).build();
        let (step, _) = step_for(&backend, 1).await;

        let outcome = step.run(factory().next_request()).await;
        assert_eq!(outcome.status(), OutcomeStatus::Timeout);
        assert!(outcome.latency() >= Duration::from_millis(1000));
        assert_eq!(step.gate().released(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_triggers_abort() {
        let backend = SimulatedBackend::builder().script(vec![Fault::Fatal]).build();
        let (step, abort) = step_for(&backend, 1).await;

        let outcome = step.run(factory().next_request()).await;
        assert_eq!(outcome.status(), OutcomeStatus::Error);
        assert!(abort.is_triggered());
        assert!(abort.cause().unwrap().contains("connection lost"));
    }

    #[tokio::test]
    async fn test_panic_becomes_error_outcome() {
        let backend = SimulatedBackend::builder().script(vec![Fault::Panic]).build();
        let (step, abort) = step_for(&backend, 1).await;

        let outcome = step.run(factory().next_request()).await;
        assert_eq!(outcome.status(), OutcomeStatus::Error);
        assert!(outcome.detail().unwrap().contains("panicked"));
        assert!(!abort.is_triggered());
        assert_eq!(step.gate().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_closed_gate_yields_error() {
        let backend = SimulatedBackend::with_latency(Duration::ZERO);
        let (step, _) = step_for(&backend, 1).await;
        step.gate().close();

        let outcome = step.run(factory().next_request()).await;
        assert_eq!(outcome.status(), OutcomeStatus::Error);
        assert_eq!(outcome.detail(), Some("admission gate closed"));
        assert_eq!(backend.stats().writes_attempted, 0);
    }
}
