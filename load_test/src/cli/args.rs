use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use surge_client::{DnsResolution, Transcoding};

use crate::config::{get_profile, ConfigError, HarnessConfig};
use crate::schedule::{Phase, Schedule};

/// Surge write load harness
#[derive(Parser, Debug)]
#[command(name = "load-test")]
#[command(about = "Bounded-concurrency write load generator for document stores")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a load test (stops early on Ctrl+C)
    Run(RunArgs),

    /// List the built-in configuration profiles
    Profiles,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// HTTP document store at --endpoint
    Http,
    /// In-process backend with fixed latency, for dry runs
    Simulated,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodingArg {
    Raw,
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Built-in profile to start from: original, smoke, soak
    #[arg(long, default_value = "original")]
    pub profile: String,

    /// JSON config file; replaces the profile
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Backend endpoint
    #[arg(long, env = "SURGE_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "SURGE_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "SURGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Target (bucket) to drop, recreate and write into
    #[arg(long)]
    pub target: Option<String>,

    /// Target capacity in MB
    #[arg(long)]
    pub target_capacity_mb: Option<u64>,

    /// Maximum operations in flight
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Per-operation timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Backoff after an overloaded write in milliseconds
    #[arg(long)]
    pub overload_backoff_ms: Option<u64>,

    /// Settle delay around target provisioning in milliseconds
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Grace period for in-flight work after the schedule ends, in milliseconds
    #[arg(long)]
    pub drain_grace_ms: Option<u64>,

    #[arg(long)]
    pub min_connections: Option<usize>,

    #[arg(long)]
    pub max_connections: Option<usize>,

    #[arg(long)]
    pub send_queue_capacity: Option<usize>,

    #[arg(long, value_enum)]
    pub transcoding: Option<TranscodingArg>,

    /// Pin the endpoint host to these addresses instead of resolving it
    #[arg(long, value_delimiter = ',')]
    pub resolve: Vec<SocketAddr>,

    /// Schedule phase, repeatable: ramp:300:10s, constant:900:20s,
    /// inject:700:10s, inject-random:500-900:2m
    #[arg(long = "phase", value_parser = parse_phase)]
    pub phases: Vec<Phase>,

    /// Seed for randomized injection rates
    #[arg(long)]
    pub seed: Option<u64>,

    /// Prefix for generated document keys
    #[arg(long)]
    pub key_prefix: Option<String>,

    #[arg(long, value_enum, default_value = "http")]
    pub backend: BackendKind,

    /// Write latency of the simulated backend in milliseconds
    #[arg(long, default_value = "5")]
    pub sim_latency_ms: u64,

    /// Simulated backend rejects this many initial writes as overloaded
    #[arg(long, default_value = "0")]
    pub sim_overload_first: u64,

    /// Metrics reporting interval in seconds (0 disables the live view)
    #[arg(long, default_value = "5")]
    pub report_interval: u64,

    /// Write the final report as JSON to this file
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Write every outcome as a JSON line to this file
    #[arg(long)]
    pub outcomes_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_phase(input: &str) -> Result<Phase, String> {
    input.parse().map_err(|e: crate::schedule::ScheduleError| e.to_string())
}

impl RunArgs {
    /// Profile or config file, then individual flag overrides
    pub fn build_config(&self) -> Result<HarnessConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)?,
            None => get_profile(&self.profile)?,
        };

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(username) = &self.username {
            config.credentials.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.credentials.password = password.clone();
        }
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(capacity) = self.target_capacity_mb {
            config.target_capacity_mb = capacity;
        }
        if let Some(max) = self.max_in_flight {
            config.max_in_flight = max;
        }
        if let Some(ms) = self.timeout_ms {
            config.operation_timeout = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.overload_backoff_ms {
            config.overload_backoff = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.settle_ms {
            config.settle_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = self.drain_grace_ms {
            config.drain_grace = std::time::Duration::from_millis(ms);
        }
        if let Some(min) = self.min_connections {
            config.pool.min_connections = min;
        }
        if let Some(max) = self.max_connections {
            config.pool.max_connections = max;
        }
        if let Some(capacity) = self.send_queue_capacity {
            config.send_queue_capacity = capacity;
        }
        if let Some(transcoding) = self.transcoding {
            config.transcoding = match transcoding {
                TranscodingArg::Raw => Transcoding::Raw,
                TranscodingArg::Json => Transcoding::Json,
            };
        }
        if !self.resolve.is_empty() {
            config.dns = DnsResolution::Static(self.resolve.clone());
        }
        if !self.phases.is_empty() {
            config.schedule = Schedule::new(self.phases.clone())?;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = prefix.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
