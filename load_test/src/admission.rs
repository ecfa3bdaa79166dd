//! Admission gate bounding the number of in-flight operations.
//!
//! Capacity is handed out as [`AdmissionToken`]s. A token returns its unit of
//! capacity when it is dropped, so every exit path of an operation releases
//! exactly once, including panics caught further up and cancellation of the
//! owning task. There is no way to release capacity without a token.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Returned by [`AdmissionGate::acquire`] once the gate has been closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission gate closed")]
pub struct GateClosed;

struct GateInner {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Bounds concurrently in-flight operations to a fixed ceiling.
///
/// Waiters are served in FIFO order. Clones share the same capacity.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    pub fn new(ceiling: NonZeroUsize) -> Self {
        let ceiling = ceiling.get();
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(ceiling)),
                ceiling,
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Wait until capacity is available and take one unit of it
    pub async fn acquire(&self) -> Result<AdmissionToken, GateClosed> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GateClosed)?;

        let now = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        self.inner.acquired.fetch_add(1, Ordering::AcqRel);

        Ok(AdmissionToken {
            gate: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Fail all pending and future acquisitions. Outstanding tokens are
    /// unaffected and still release normally.
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    pub fn ceiling(&self) -> usize {
        self.inner.ceiling
    }

    /// Tokens currently outstanding
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of tokens outstanding at once
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Tokens handed out over the gate's lifetime
    pub fn acquired(&self) -> u64 {
        self.inner.acquired.load(Ordering::Acquire)
    }

    /// Tokens returned over the gate's lifetime
    pub fn released(&self) -> u64 {
        self.inner.released.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("ceiling", &self.ceiling())
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One unit of in-flight capacity
#[must_use = "dropping the token immediately releases its capacity"]
pub struct AdmissionToken {
    gate: Arc<GateInner>,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionToken {
    /// Return the capacity to the gate
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        // Counters are updated before the permit field is dropped, so a new
        // holder can never observe more than `ceiling` tokens in flight.
        self.gate.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.gate.released.fetch_add(1, Ordering::AcqRel);
    }
}
