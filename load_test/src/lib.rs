//! Bounded-concurrency write load harness.
//!
//! A [`Harness`] opens a session through a [`surge_client::Connector`],
//! provisions the target, then follows a [`Schedule`] of ramp, constant and
//! injection phases. Every operation passes through an [`AdmissionGate`]
//! that caps how many writes are in flight, and ends as one classified
//! [`Outcome`] in the [`ResultAggregator`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use load_test::{Harness, HarnessConfig, Phase, Schedule};
//! use surge_testsuite::SimulatedBackend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig {
//!     max_in_flight: 8,
//!     schedule: Schedule::new(vec![Phase::constant(16, Duration::from_secs(5))])?,
//!     ..HarnessConfig::default()
//! };
//! let backend = SimulatedBackend::with_latency(Duration::from_millis(5));
//! let report = Harness::new(config, Arc::new(backend))?.run().await?;
//! println!("{} ok of {}", report.counts.ok, report.total);
//! # Ok(())
//! # }
//! ```

pub mod abort;
pub mod admission;
pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod outcome;
pub mod schedule;
pub mod step;
pub mod utils;

pub use abort::AbortSignal;
pub use admission::{AdmissionGate, AdmissionToken, GateClosed};
pub use config::{ConfigError, HarnessConfig};
pub use error::HarnessError;
pub use harness::{Harness, HarnessState};
pub use metrics::{JsonLinesSink, OutcomeSink, ResultAggregator, RunReport};
pub use outcome::{Outcome, OutcomeStatus};
pub use schedule::{LoadTarget, Phase, Schedule, ScheduleError, TrafficShaper};
pub use step::{ExecutionStep, RequestFactory};
