//! Harness driver: setup, shaped load, drain, teardown.

use std::num::NonZeroUsize;
use std::sync::Arc;

use surge_client::{retry_with_backoff, Connector, Provisioner, Session};
use surge_core::BackendError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::workers::{ClosedLoopPool, Injector, Launcher};
use crate::abort::AbortSignal;
use crate::admission::AdmissionGate;
use crate::config::{ConfigError, HarnessConfig};
use crate::error::HarnessError;
use crate::metrics::{OutcomeSink, ResultAggregator, RunReport};
use crate::schedule::{LoadTarget, TrafficShaper};
use crate::step::{ExecutionStep, RequestFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    Setup,
    Running,
    Teardown,
    Done,
}

impl HarnessState {
    fn can_transition_to(self, next: HarnessState) -> bool {
        use HarnessState::*;
        matches!(
            (self, next),
            (Idle, Setup)
                | (Setup, Running)
                | (Setup, Teardown)
                | (Setup, Done)
                | (Running, Teardown)
                | (Teardown, Done)
        )
    }
}

/// Why setup ended before the run started
enum Interrupted {
    Failed(BackendError),
    Aborted(String),
}

/// Drives one load run against a connector.
///
/// `run` consumes the harness, so a harness reaches `Done` exactly once.
pub struct Harness {
    config: HarnessConfig,
    connector: Arc<dyn Connector>,
    gate: AdmissionGate,
    aggregator: ResultAggregator,
    abort: AbortSignal,
    state: HarnessState,
    seed: u64,
}

impl Harness {
    pub fn new(config: HarnessConfig, connector: Arc<dyn Connector>) -> Result<Self, HarnessError> {
        config.validate()?;
        let ceiling = NonZeroUsize::new(config.max_in_flight)
            .ok_or_else(|| ConfigError::Invalid("max_in_flight must be at least 1".to_string()))?;
        let gate = AdmissionGate::new(ceiling);
        let seed = config.seed.unwrap_or_else(rand::random);

        Ok(Self {
            aggregator: ResultAggregator::new().with_gate(gate.clone()),
            gate,
            config,
            connector,
            abort: AbortSignal::new(),
            state: HarnessState::Idle,
            seed,
        })
    }

    /// Forward every outcome to `sink`
    pub fn with_sink(self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.aggregator.add_sink(sink);
        self
    }

    /// Handle for stopping the run from outside, e.g. on Ctrl+C
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Live view of the run's results
    pub fn aggregator(&self) -> ResultAggregator {
        self.aggregator.clone()
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn transition(&mut self, next: HarnessState) -> Result<(), HarnessError> {
        if !self.state.can_transition_to(next) {
            return Err(HarnessError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::info!("Harness {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    pub async fn run(mut self) -> Result<RunReport, HarnessError> {
        self.transition(HarnessState::Setup)?;

        tracing::info!("Connecting to {}", self.config.endpoint);
        let opened = tokio::select! {
            biased;
            cause = self.abort.triggered() => Err(Interrupted::Aborted(cause)),
            result = self.open_session() => result.map_err(Interrupted::Failed),
        };
        let session = match opened {
            Ok(session) => session,
            Err(interrupted) => {
                if let Interrupted::Failed(e) = &interrupted {
                    tracing::error!("Could not open session: {}", e);
                }
                self.transition(HarnessState::Done)?;
                return Err(self.setup_error(interrupted));
            }
        };

        let provisioned = tokio::select! {
            biased;
            cause = self.abort.triggered() => Err(Interrupted::Aborted(cause)),
            result = self.provision(&session) => result.map_err(Interrupted::Failed),
        };
        if let Err(interrupted) = provisioned {
            if let Interrupted::Failed(e) = &interrupted {
                tracing::error!("Could not provision target '{}': {}", self.config.target, e);
            }
            self.transition(HarnessState::Teardown)?;
            if let Err(close_err) = session.close().await {
                tracing::warn!("Closing session after failed setup: {}", close_err);
            }
            self.transition(HarnessState::Done)?;
            return Err(self.setup_error(interrupted));
        }

        self.transition(HarnessState::Running)?;
        let aborted = self.drive(session.clone()).await;

        self.transition(HarnessState::Teardown)?;
        let closed = session.close().await;
        self.aggregator.flush_sinks();
        let report = self.aggregator.snapshot();
        self.transition(HarnessState::Done)?;

        match (aborted, closed) {
            (Some(cause), closed) => {
                if let Err(e) = closed {
                    tracing::error!("Teardown after abort failed: {}", e);
                }
                Err(HarnessError::Aborted {
                    cause,
                    report: Box::new(report),
                })
            }
            (None, Err(source)) => {
                tracing::error!("Teardown failed: {}", source);
                Err(HarnessError::Teardown {
                    source,
                    report: Box::new(report),
                })
            }
            (None, Ok(())) => {
                tracing::info!(
                    "Run complete: {} operations, {} ok",
                    report.total,
                    report.counts.ok
                );
                Ok(report)
            }
        }
    }

    fn setup_error(&self, interrupted: Interrupted) -> HarnessError {
        match interrupted {
            Interrupted::Failed(e) => HarnessError::Setup(e),
            Interrupted::Aborted(cause) => {
                tracing::warn!("Stopped during setup: {}", cause);
                HarnessError::Aborted {
                    cause,
                    report: Box::new(self.aggregator.snapshot()),
                }
            }
        }
    }

    async fn open_session(&self) -> Result<Arc<dyn Session>, BackendError> {
        let options = self.config.connect_options();
        let policy = self.config.retry.policy();
        let (connector, options) = (&self.connector, &options);
        retry_with_backoff(&policy, "open session", || connector.open(options)).await
    }

    async fn provision(&self, session: &Arc<dyn Session>) -> Result<(), BackendError> {
        let target = self.config.target_spec();
        let policy = self.config.retry.policy();
        tracing::info!(
            "Provisioning target '{}' ({} MB)",
            target.name,
            target.capacity_mb
        );
        let spec = &target;
        retry_with_backoff(&policy, "provision target", || session.ensure_target(spec)).await?;

        if !self.config.settle_delay.is_zero() {
            tracing::info!(
                "Waiting {:?} for target to settle",
                self.config.settle_delay
            );
            tokio::time::sleep(self.config.settle_delay).await;
        }
        Ok(())
    }

    /// Run the schedule, then drain. Returns the abort cause, if any.
    async fn drive(&self, session: Arc<dyn Session>) -> Option<String> {
        let config = &self.config;
        let step = Arc::new(ExecutionStep::new(
            self.gate.clone(),
            session,
            config.operation_timeout,
            config.overload_backoff,
            self.abort.clone(),
        ));
        let requests = RequestFactory::new(&config.key_prefix, &config.payload);
        tracing::info!("Payload: {} bytes per write", requests.payload_size());
        let launcher = Launcher::new(step, requests, self.aggregator.clone());
        let mut pool = ClosedLoopPool::new(launcher.clone());
        let mut injector = Injector::new(launcher);
        let shaper = TrafficShaper::new(&config.schedule, self.seed);
        let phase_count = config.schedule.phases().len();

        tracing::info!(
            "Running schedule {} ({:?} total, ceiling {}, seed {})",
            config.schedule,
            shaper.total_duration(),
            self.gate.ceiling(),
            self.seed
        );

        self.aggregator.begin_run();
        let start = Instant::now();
        let mut ticker = interval_at(start, config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut current_phase = None;
        let mut aborted = None;

        loop {
            let now = tokio::select! {
                biased;
                cause = self.abort.triggered() => {
                    aborted = Some(cause);
                    break;
                }
                now = ticker.tick() => now,
            };

            let elapsed = now.saturating_duration_since(start);
            let Some(target) = shaper.target_at(elapsed) else {
                break;
            };

            if let Some((index, phase)) = shaper.phase_at(elapsed) {
                if current_phase != Some(index) {
                    tracing::info!("Phase {}/{}: {}", index + 1, phase_count, phase);
                    current_phase = Some(index);
                }
            }

            match target {
                LoadTarget::Concurrency(copies) => {
                    injector.pause();
                    pool.scale_to(copies);
                }
                LoadTarget::Rate(rate) => {
                    pool.scale_to(0);
                    let started = injector.inject(rate, now, config.tick);
                    tracing::debug!("Injected {} operations at {}/s", started, rate);
                }
            }
        }

        pool.stop();
        if let Some(cause) = &aborted {
            tracing::warn!("Stopping early: {}", cause);
            self.gate.close();
        } else {
            tracing::info!("Schedule complete");
        }

        tracing::info!(
            "Waiting up to {:?} for {} workers and {} injected operations...",
            config.drain_grace,
            pool.len(),
            injector.len()
        );
        let drained = tokio::time::timeout(config.drain_grace, async {
            pool.join_all().await;
            injector.join_all().await;
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "Drain grace period elapsed, abandoning {} workers and {} injected operations",
                pool.len(),
                injector.len()
            );
            pool.abort_all().await;
            injector.abort_all().await;
        }

        let abandoned = self.aggregator.mark_abandoned();
        if abandoned > 0 {
            tracing::warn!("{} operations abandoned", abandoned);
        }

        aborted.or_else(|| self.abort.cause())
    }
}
