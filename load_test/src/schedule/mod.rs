//! Declarative traffic schedules and their resolution over time

pub mod phase;
pub mod shaper;

pub use phase::{Phase, Schedule, ScheduleError, MAX_SCHEDULE_DURATION};
pub use shaper::{LoadTarget, TrafficShaper};
