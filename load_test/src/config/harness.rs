//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use surge_client::{ConnectOptions, Credentials, DnsResolution, PoolOptions, RetryPolicy, Transcoding};
use surge_core::{PayloadTemplate, TargetSpec};
use thiserror::Error;

use crate::schedule::{Schedule, ScheduleError};
use crate::utils::duration_ms;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Backoff for connecting and provisioning during setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "initial_interval_ms", with = "duration_ms")]
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    #[serde(rename = "maximum_interval_ms", with = "duration_ms")]
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            initial_interval: policy.initial_interval,
            backoff_coefficient: policy.backoff_coefficient,
            maximum_interval: policy.maximum_interval,
            maximum_attempts: policy.maximum_attempts,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_interval: self.initial_interval,
            backoff_coefficient: self.backoff_coefficient,
            maximum_interval: self.maximum_interval,
            maximum_attempts: self.maximum_attempts,
        }
    }
}

/// Everything one run needs.
///
/// Missing fields in a config file take their default values, which
/// reproduce the `original` profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    pub pool: PoolOptions,
    pub send_queue_capacity: usize,
    pub transcoding: Transcoding,
    pub dns: DnsResolution,
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Destination the writes land in; dropped and recreated during setup
    pub target: String,
    pub target_capacity_mb: u64,
    pub key_prefix: String,
    pub payload: PayloadTemplate,

    /// Admission ceiling
    pub max_in_flight: usize,
    #[serde(rename = "operation_timeout_ms", with = "duration_ms")]
    pub operation_timeout: Duration,
    /// Sleep after an overloaded write, with the admission token held
    #[serde(rename = "overload_backoff_ms", with = "duration_ms")]
    pub overload_backoff: Duration,
    /// Wait between dropping and recreating the target, and again after
    #[serde(rename = "settle_delay_ms", with = "duration_ms")]
    pub settle_delay: Duration,
    /// How long in-flight work may finish after the schedule ends
    #[serde(rename = "drain_grace_ms", with = "duration_ms")]
    pub drain_grace: Duration,
    #[serde(rename = "tick_ms", with = "duration_ms")]
    pub tick: Duration,
    /// Seed for randomized rates; drawn at startup when absent
    pub seed: Option<u64>,

    pub schedule: Schedule,
    pub retry: RetryConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8091".to_string(),
            credentials: Credentials::new("Administrator", "password"),
            pool: PoolOptions::default(),
            send_queue_capacity: 4096,
            transcoding: Transcoding::Raw,
            dns: DnsResolution::System,
            connect_timeout: Duration::from_secs(10),
            target: "PerfTesting".to_string(),
            target_capacity_mb: 1024,
            key_prefix: String::new(),
            payload: PayloadTemplate::default(),
            max_in_flight: 120,
            operation_timeout: Duration::from_millis(1000),
            overload_backoff: Duration::from_millis(100),
            settle_delay: Duration::from_secs(5),
            drain_grace: Duration::from_secs(10),
            tick: Duration::from_millis(100),
            seed: None,
            schedule: Schedule::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HarnessConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.endpoint.trim().is_empty() {
            return invalid("endpoint must not be empty");
        }
        if self.target.trim().is_empty() {
            return invalid("target must not be empty");
        }
        if self.max_in_flight == 0 {
            return invalid("max_in_flight must be at least 1");
        }
        if self.operation_timeout.is_zero() {
            return invalid("operation timeout must be greater than zero");
        }
        if self.tick.is_zero() {
            return invalid("tick must be greater than zero");
        }
        if self.pool.max_connections == 0 {
            return invalid("pool max_connections must be at least 1");
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::Invalid(format!(
                "pool min_connections ({}) exceeds max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        if !self.retry.backoff_coefficient.is_finite() || self.retry.backoff_coefficient < 1.0 {
            return invalid("retry backoff_coefficient must be at least 1.0");
        }
        // Deserialized schedules are checked on the way in; this covers
        // values assembled in code.
        Schedule::new(self.schedule.phases().to_vec())?;
        Ok(())
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.endpoint.clone())
            .with_credentials(self.credentials.clone())
            .with_pool(self.pool)
            .with_send_queue_capacity(self.send_queue_capacity)
            .with_transcoding(self.transcoding)
            .with_dns(self.dns.clone());
        options.connect_timeout = self.connect_timeout;
        options
    }

    pub fn target_spec(&self) -> TargetSpec {
        TargetSpec::new(self.target.clone(), self.target_capacity_mb).with_settle(self.settle_delay)
    }
}
