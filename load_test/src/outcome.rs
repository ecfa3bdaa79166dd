//! Classified result of one operation attempt

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::duration_us;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    /// Backend rejected the write as overloaded
    Overload,
    /// Deadline elapsed or the backend reported a timeout
    Timeout,
    Error,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeStatus::Ok => "ok",
            OutcomeStatus::Overload => "overload",
            OutcomeStatus::Timeout => "timeout",
            OutcomeStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Immutable once built; one per execution step invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    key: String,
    status: OutcomeStatus,
    #[serde(rename = "latency_us", with = "duration_us")]
    latency: Duration,
    #[serde(rename = "admission_wait_us", with = "duration_us")]
    admission_wait: Duration,
    size_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl Outcome {
    pub fn new(
        key: impl Into<String>,
        status: OutcomeStatus,
        latency: Duration,
        admission_wait: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            status,
            latency,
            admission_wait,
            size_bytes: 0,
            detail: None,
        }
    }

    pub fn with_size(mut self, size_bytes: usize) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }

    /// Time spent in the backend write
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Time spent waiting for an admission token
    pub fn admission_wait(&self) -> Duration {
        self.admission_wait
    }

    /// Payload bytes written; zero unless the write succeeded
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_line() {
        let outcome = Outcome::new(
            "doc-1",
            OutcomeStatus::Timeout,
            Duration::from_millis(1000),
            Duration::from_micros(250),
        )
        .with_detail("deadline elapsed");

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "timeout");
        assert_eq!(json["latency_us"], 1_000_000);
        assert_eq!(json["admission_wait_us"], 250);
        assert_eq!(json["detail"], "deadline elapsed");

        let ok = Outcome::new("doc-2", OutcomeStatus::Ok, Duration::ZERO, Duration::ZERO);
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("detail").is_none());
        assert!(ok.is_ok());
    }
}
