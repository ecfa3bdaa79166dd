//! Connector, session and provisioning traits.
//!
//! The harness only talks to a backend through these traits. A connector
//! opens a [`Session`]; the session is owned by the run, shared with every
//! execution step, and closed exactly once during teardown.

use crate::options::ConnectOptions;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{BackendError, TargetSpec};

/// Opens sessions against a backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session with the given endpoint, credentials and tuning options
    async fn open(&self, options: &ConnectOptions) -> Result<Arc<dyn Session>, BackendError>;
}

/// Creates or resets the destination resource before a run
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Idempotent create-or-reset of the target.
    ///
    /// Backends without a notion of provisioning keep the default no-op.
    async fn ensure_target(&self, target: &TargetSpec) -> Result<(), BackendError> {
        tracing::debug!("No provisioning required for target '{}'", target.name);
        Ok(())
    }
}

/// An open connection context with the backend
#[async_trait]
pub trait Session: Provisioner {
    /// Write `payload` under `key`.
    ///
    /// `timeout` is advisory for the backend; the harness enforces its own
    /// deadline around this call as well.
    async fn write(&self, key: &str, payload: &[u8], timeout: Duration)
        -> Result<(), BackendError>;

    /// Release every resource held by the session
    async fn close(&self) -> Result<(), BackendError>;
}
