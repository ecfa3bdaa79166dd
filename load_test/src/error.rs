//! Harness-level errors

use surge_core::BackendError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::harness::HarnessState;
use crate::metrics::RunReport;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Connecting or provisioning failed; no operation was started
    #[error("setup failed: {0}")]
    Setup(#[source] BackendError),

    /// A fatal backend error or an interrupt ended setup or the run early
    #[error("run aborted: {cause}")]
    Aborted {
        cause: String,
        report: Box<RunReport>,
    },

    #[error("teardown failed: {source}")]
    Teardown {
        #[source]
        source: BackendError,
        report: Box<RunReport>,
    },

    #[error("invalid harness transition {from:?} -> {to:?}")]
    InvalidTransition { from: HarnessState, to: HarnessState },
}

impl HarnessError {
    /// Report of the partial run; empty if the abort came during setup
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            HarnessError::Aborted { report, .. } | HarnessError::Teardown { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }
}
