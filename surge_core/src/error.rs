//! Error types for backend sessions.
//!
//! Every failure a backend can report is a [`BackendError`]. The harness
//! never matches on the concrete variants when classifying an operation; it
//! asks for the [`ErrorKind`] instead, which is the four-way taxonomy the
//! reports are built on.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure classes used by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Backend signaled saturation. Not fatal, the caller backs off.
    Overload,
    /// The operation exceeded its deadline.
    Timeout,
    /// Recoverable backend fault.
    Transient,
    /// Configuration or connectivity fault preventing further progress.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Overload => write!(f, "OVERLOAD"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::Transient => write!(f, "TRANSIENT"),
            ErrorKind::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Errors reported by a backend connector or session.
///
/// These preserve enough detail for logs while mapping cleanly onto
/// [`ErrorKind`] for classification and retry decisions.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Failed to establish a connection to the backend
    #[error("Connection failed to {endpoint}: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    /// Invalid endpoint URL provided
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The backend (or the client-side send queue) is saturated
    #[error("Backend overloaded: {0}")]
    Overload(String),

    /// Request timed out
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Recoverable backend failure
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// Payload could not be transcoded for the wire
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Provisioning the destination resource failed
    #[error("Provisioning failed for target '{target}': {message}")]
    Provisioning { target: String, message: String },

    /// The session was already closed
    #[error("Session closed")]
    SessionClosed,
}

impl BackendError {
    /// Create a connection failed error for a specific endpoint
    pub fn connection_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::ConnectionFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a provisioning error for a target
    pub fn provisioning(target: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Provisioning {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Map this error onto the harness taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Overload(_) => ErrorKind::Overload,
            BackendError::Timeout(_) => ErrorKind::Timeout,
            BackendError::Transient(_) | BackendError::Encoding(_) => ErrorKind::Transient,
            BackendError::ConnectionFailed { .. }
            | BackendError::InvalidEndpoint(_)
            | BackendError::Unauthorized(_)
            | BackendError::Provisioning { .. }
            | BackendError::SessionClosed => ErrorKind::Fatal,
        }
    }

    /// Check if this error is retryable during setup
    ///
    /// A refused connection is fatal for a running workload but worth
    /// retrying while the backend may still be starting up.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::ConnectionFailed { .. } => true,
            BackendError::Provisioning { .. } => true,
            other => matches!(
                other.kind(),
                ErrorKind::Overload | ErrorKind::Timeout | ErrorKind::Transient
            ),
        }
    }

    /// Check if this error must halt the run
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            BackendError::Overload("send queue full".into()).kind(),
            ErrorKind::Overload
        );
        assert_eq!(
            BackendError::Timeout(Duration::from_millis(5)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            BackendError::Encoding("bad json".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(BackendError::SessionClosed.kind(), ErrorKind::Fatal);
        assert_eq!(
            BackendError::Unauthorized("bad password".into()).kind(),
            ErrorKind::Fatal
        );
    }

    #[test]
    fn test_connection_failure_is_fatal_but_retryable() {
        let err = BackendError::connection_failed("http://localhost:8091", "refused");
        assert!(err.is_fatal());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("http://localhost:8091"));
    }

    #[test]
    fn test_unauthorized_is_not_retryable() {
        let err = BackendError::Unauthorized("401".into());
        assert!(!err.is_retryable());
    }
}
