//! Run-wide abort signal

use std::sync::Arc;
use tokio::sync::watch;

/// Shared flag that ends the running phase early.
///
/// The first trigger wins; later causes are logged and dropped.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request an abort. Returns `true` if this call set the cause.
    pub fn trigger(&self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        let set = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause.clone());
            true
        });

        if set {
            tracing::error!("Aborting run: {}", cause);
        } else {
            tracing::debug!("Abort already requested, ignoring: {}", cause);
        }
        set
    }

    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn cause(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolve with the cause once an abort has been requested
    pub async fn triggered(&self) -> String {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(cause) = rx.borrow_and_update().clone() {
                return cause;
            }
            if rx.changed().await.is_err() {
                // Unreachable while `self` holds the sender
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}
