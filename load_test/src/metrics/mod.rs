pub mod collector;
pub mod reporter;
pub mod sink;
pub mod types;

pub use collector::ResultAggregator;
pub use sink::{JsonLinesSink, OutcomeSink};
pub use types::{LatencyStats, RunReport, StatusCounts, SystemMetrics};
