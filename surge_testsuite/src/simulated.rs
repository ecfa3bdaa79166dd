//! In-memory backend with scripted latency and faults.
//!
//! [`SimulatedBackend`] is a connector whose sessions never leave the
//! process. Every write sleeps for the configured latency and then resolves
//! according to the fault plan, which makes harness behavior reproducible
//! without a running document store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use surge_client::{ConnectOptions, Connector, Provisioner, Session};
use surge_core::{BackendError, TargetSpec};

/// Scripted result of a single write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Ok,
    /// Reject as overloaded (send queue full)
    Overload,
    /// Report a backend-side timeout
    Timeout,
    Transient,
    /// Lose the connection; fatal for the run
    Fatal,
    /// Never complete; only the caller's deadline ends the write
    Hang,
    /// Panic inside the write
    Panic,
}

/// Counters observed by the simulated backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    pub writes_attempted: u64,
    pub writes_succeeded: u64,
    pub distinct_keys: usize,
    pub peak_concurrent_writes: usize,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub provisioned_targets: Vec<String>,
}

struct Inner {
    latency: Duration,
    overload_first: u64,
    script: Vec<Fault>,
    open_failures_left: AtomicU32,
    provision_failures_left: AtomicU32,
    fail_close: bool,

    writes_attempted: AtomicU64,
    writes_succeeded: AtomicU64,
    concurrent_writes: AtomicUsize,
    peak_concurrent_writes: AtomicUsize,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    keys: Mutex<HashSet<String>>,
    provisioned: Mutex<Vec<String>>,
}

impl Inner {
    fn fault_for(&self, attempt: u64) -> Fault {
        if attempt < self.overload_first {
            return Fault::Overload;
        }
        if self.script.is_empty() {
            return Fault::Ok;
        }
        let index = (attempt - self.overload_first) % self.script.len() as u64;
        self.script[index as usize]
    }
}

/// Builder for [`SimulatedBackend`]
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackendBuilder {
    latency: Duration,
    overload_first: u64,
    script: Vec<Fault>,
    open_failures: u32,
    provision_failures: u32,
    fail_close: bool,
}

impl SimulatedBackendBuilder {
    /// Time every write takes before resolving
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the first `n` writes as overloaded
    pub fn overload_first(mut self, n: u64) -> Self {
        self.overload_first = n;
        self
    }

    /// Repeating fault plan applied after the overloaded prefix
    pub fn script(mut self, script: Vec<Fault>) -> Self {
        self.script = script;
        self
    }

    /// Refuse the first `n` connection attempts
    pub fn fail_open(mut self, n: u32) -> Self {
        self.open_failures = n;
        self
    }

    /// Fail the first `n` provisioning attempts
    pub fn fail_provision(mut self, n: u32) -> Self {
        self.provision_failures = n;
        self
    }

    /// Make `close` report a failure
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn build(self) -> SimulatedBackend {
        SimulatedBackend {
            inner: Arc::new(Inner {
                latency: self.latency,
                overload_first: self.overload_first,
                script: self.script,
                open_failures_left: AtomicU32::new(self.open_failures),
                provision_failures_left: AtomicU32::new(self.provision_failures),
                fail_close: self.fail_close,
                writes_attempted: AtomicU64::new(0),
                writes_succeeded: AtomicU64::new(0),
                concurrent_writes: AtomicUsize::new(0),
                peak_concurrent_writes: AtomicUsize::new(0),
                sessions_opened: AtomicU64::new(0),
                sessions_closed: AtomicU64::new(0),
                keys: Mutex::new(HashSet::new()),
                provisioned: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// In-memory connector. Clones share state.
#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Inner>,
}

impl SimulatedBackend {
    pub fn builder() -> SimulatedBackendBuilder {
        SimulatedBackendBuilder::default()
    }

    /// Backend that accepts every write after `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self::builder().latency(latency).build()
    }

    pub fn stats(&self) -> SimulatedStats {
        SimulatedStats {
            writes_attempted: self.inner.writes_attempted.load(Ordering::SeqCst),
            writes_succeeded: self.inner.writes_succeeded.load(Ordering::SeqCst),
            distinct_keys: self.inner.keys.lock().len(),
            peak_concurrent_writes: self.inner.peak_concurrent_writes.load(Ordering::SeqCst),
            sessions_opened: self.inner.sessions_opened.load(Ordering::SeqCst),
            sessions_closed: self.inner.sessions_closed.load(Ordering::SeqCst),
            provisioned_targets: self.inner.provisioned.lock().clone(),
        }
    }
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("latency", &self.inner.latency)
            .field("overload_first", &self.inner.overload_first)
            .field("script", &self.inner.script)
            .finish()
    }
}

#[async_trait]
impl Connector for SimulatedBackend {
    async fn open(&self, options: &ConnectOptions) -> Result<Arc<dyn Session>, BackendError> {
        let refused = self
            .inner
            .open_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BackendError::connection_failed(
                &options.endpoint,
                "simulated connection refused",
            ));
        }

        self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Simulated session opened for {}", options.endpoint);
        Ok(Arc::new(SimulatedSession {
            inner: self.inner.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session handed out by [`SimulatedBackend`]
pub struct SimulatedSession {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

/// Tracks concurrent writes, released on every exit path
struct WriteGuard<'a>(&'a Inner);

impl<'a> WriteGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.concurrent_writes.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_concurrent_writes.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.concurrent_writes.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provisioner for SimulatedSession {
    async fn ensure_target(&self, target: &TargetSpec) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::SessionClosed);
        }
        let failed = self
            .inner
            .provision_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::provisioning(
                &target.name,
                "simulated provisioning failure",
            ));
        }
        self.inner.provisioned.lock().push(target.name.clone());
        Ok(())
    }
}

#[async_trait]
impl Session for SimulatedSession {
    async fn write(
        &self,
        key: &str,
        _payload: &[u8],
        timeout: Duration,
    ) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::SessionClosed);
        }

        let attempt = self.inner.writes_attempted.fetch_add(1, Ordering::SeqCst);
        let _guard = WriteGuard::enter(&self.inner);

        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }

        match self.inner.fault_for(attempt) {
            Fault::Ok => {
                self.inner.keys.lock().insert(key.to_string());
                self.inner.writes_succeeded.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Fault::Overload => Err(BackendError::Overload("send queue full".to_string())),
            Fault::Timeout => Err(BackendError::Timeout(timeout)),
            Fault::Transient => Err(BackendError::Transient(
                "simulated temporary failure".to_string(),
            )),
            Fault::Fatal => Err(BackendError::connection_failed(
                "simulated",
                "connection lost",
            )),
            Fault::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Fault::Panic => panic!("simulated backend panic on write {}", attempt),
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BackendError::SessionClosed);
        }
        self.inner.sessions_closed.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_close {
            return Err(BackendError::Transient("simulated close failure".to_string()));
        }
        Ok(())
    }
}
