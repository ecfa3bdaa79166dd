//! Closed-loop worker pool and open-loop injector

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::metrics::ResultAggregator;
use crate::step::{ExecutionStep, RequestFactory};

/// Runs one operation end to end: count it, execute it, record it
#[derive(Clone)]
pub struct Launcher {
    step: Arc<ExecutionStep>,
    requests: RequestFactory,
    aggregator: ResultAggregator,
}

impl Launcher {
    pub fn new(step: Arc<ExecutionStep>, requests: RequestFactory, aggregator: ResultAggregator) -> Self {
        Self {
            step,
            requests,
            aggregator,
        }
    }

    pub async fn run_one(&self) {
        self.aggregator.op_started();
        let outcome = self.step.run(self.requests.next_request()).await;
        self.aggregator.record(outcome);
    }

    fn is_stopped(&self) -> bool {
        self.step.gate().is_closed()
    }
}

fn log_join_error(e: JoinError) {
    if e.is_panic() {
        tracing::error!("Worker task panicked: {}", e);
    }
}

/// Clears a slot's occupied flag however its worker ends
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Looping workers, one per slot. Worker `i` keeps issuing operations while
/// `i` is below the target and exits after its current operation otherwise.
pub struct ClosedLoopPool {
    launcher: Launcher,
    target: watch::Sender<usize>,
    occupied: Vec<Arc<AtomicBool>>,
    tasks: JoinSet<()>,
}

impl ClosedLoopPool {
    pub fn new(launcher: Launcher) -> Self {
        let (target, _) = watch::channel(0);
        Self {
            launcher,
            target,
            occupied: Vec::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn scale_to(&mut self, copies: usize) {
        self.reap();
        self.target.send_if_modified(|current| {
            let changed = *current != copies;
            *current = copies;
            changed
        });

        while self.occupied.len() < copies {
            self.occupied.push(Arc::new(AtomicBool::new(false)));
        }
        for slot in 0..copies {
            if !self.occupied[slot].load(Ordering::Acquire) {
                self.spawn_worker(slot);
            }
        }
    }

    fn spawn_worker(&mut self, slot: usize) {
        let flag = self.occupied[slot].clone();
        flag.store(true, Ordering::Release);

        let launcher = self.launcher.clone();
        let target = self.target.subscribe();
        self.tasks.spawn(async move {
            let _guard = SlotGuard(flag);
            loop {
                let wanted = *target.borrow();
                if slot >= wanted || launcher.is_stopped() {
                    break;
                }
                launcher.run_one().await;
            }
        });
    }

    /// Ask every worker to exit after its current operation
    pub fn stop(&mut self) {
        self.target.send_replace(0);
    }

    /// Workers not yet exited
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                log_join_error(e);
            }
        }
    }

    pub async fn join_all(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                log_join_error(e);
            }
        }
    }

    /// Cancel remaining workers and wait for them to unwind
    pub async fn abort_all(&mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

/// Starts operations at a rate, independent of how many are outstanding.
///
/// Fractional operations carry over between ticks as credit.
pub struct Injector {
    launcher: Launcher,
    credit: f64,
    last_tick: Option<Instant>,
    tasks: JoinSet<()>,
}

impl Injector {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            credit: 0.0,
            last_tick: None,
            tasks: JoinSet::new(),
        }
    }

    /// Start the operations due since the previous tick. The first tick
    /// after a pause accounts for `first_interval`.
    pub fn inject(&mut self, rate: u32, now: Instant, first_interval: Duration) -> u64 {
        self.reap();

        let dt = match self.last_tick {
            Some(last) => now.saturating_duration_since(last),
            None => first_interval,
        };
        self.last_tick = Some(now);

        self.credit += f64::from(rate) * dt.as_secs_f64();
        let due = (self.credit + 1e-9).floor();
        self.credit = (self.credit - due).max(0.0);

        let due = due as u64;
        for _ in 0..due {
            let launcher = self.launcher.clone();
            self.tasks.spawn(async move { launcher.run_one().await });
        }
        due
    }

    /// Forget accumulated credit while a closed-loop phase runs
    pub fn pause(&mut self) {
        self.last_tick = None;
        self.credit = 0.0;
        self.reap();
    }

    /// Injected operations not yet finished
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                log_join_error(e);
            }
        }
    }

    pub async fn join_all(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                log_join_error(e);
            }
        }
    }

    pub async fn abort_all(&mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}
