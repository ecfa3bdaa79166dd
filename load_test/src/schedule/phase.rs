//! Traffic phases and the schedule they form.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{duration_ms, format_duration, parse_duration};

/// Longest schedule a run may follow, summed over all phases
pub const MAX_SCHEDULE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("schedule has no phases")]
    Empty,

    #[error("phase {index} has a zero duration")]
    ZeroDuration { index: usize },

    #[error("phase {index} has min rate {min} above max rate {max}")]
    InvalidRateRange { index: usize, min: u32, max: u32 },

    #[error("schedule exceeds {limit:?} at phase {index}")]
    TooLong { index: usize, limit: Duration },

    #[error("invalid phase '{input}': {reason}")]
    Parse { input: String, reason: String },
}

/// One segment of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    /// Closed-model concurrency interpolated linearly up (or down) to `copies`
    Ramp {
        copies: usize,
        #[serde(rename = "during_ms", with = "duration_ms")]
        during: Duration,
    },
    /// Closed-model concurrency held at `copies`
    Constant {
        copies: usize,
        #[serde(rename = "during_ms", with = "duration_ms")]
        during: Duration,
    },
    /// Open-model injection of `rate` new operations per second
    InjectFixed {
        rate: u32,
        #[serde(rename = "during_ms", with = "duration_ms")]
        during: Duration,
    },
    /// Open-model injection at a rate re-drawn every second from
    /// `min_rate..=max_rate`
    InjectRandom {
        min_rate: u32,
        max_rate: u32,
        #[serde(rename = "during_ms", with = "duration_ms")]
        during: Duration,
    },
}

impl Phase {
    pub fn ramp(copies: usize, during: Duration) -> Self {
        Phase::Ramp { copies, during }
    }

    pub fn constant(copies: usize, during: Duration) -> Self {
        Phase::Constant { copies, during }
    }

    pub fn inject(rate: u32, during: Duration) -> Self {
        Phase::InjectFixed { rate, during }
    }

    pub fn inject_random(min_rate: u32, max_rate: u32, during: Duration) -> Self {
        Phase::InjectRandom {
            min_rate,
            max_rate,
            during,
        }
    }

    pub fn during(&self) -> Duration {
        match *self {
            Phase::Ramp { during, .. }
            | Phase::Constant { during, .. }
            | Phase::InjectFixed { during, .. }
            | Phase::InjectRandom { during, .. } => during,
        }
    }

    /// Whether the phase drives looping workers rather than injecting
    pub fn is_closed_model(&self) -> bool {
        matches!(self, Phase::Ramp { .. } | Phase::Constant { .. })
    }

    /// Concurrency level this phase ends at; injection phases leave none
    pub fn final_concurrency(&self) -> usize {
        match *self {
            Phase::Ramp { copies, .. } | Phase::Constant { copies, .. } => copies,
            _ => 0,
        }
    }

    fn validate(&self, index: usize) -> Result<(), ScheduleError> {
        if self.during().is_zero() {
            return Err(ScheduleError::ZeroDuration { index });
        }
        if self.during() > MAX_SCHEDULE_DURATION {
            return Err(ScheduleError::TooLong {
                index,
                limit: MAX_SCHEDULE_DURATION,
            });
        }
        if let Phase::InjectRandom {
            min_rate, max_rate, ..
        } = *self
        {
            if min_rate > max_rate {
                return Err(ScheduleError::InvalidRateRange {
                    index,
                    min: min_rate,
                    max: max_rate,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Phase::Ramp { copies, during } => {
                write!(f, "ramp:{}:{}", copies, format_duration(during))
            }
            Phase::Constant { copies, during } => {
                write!(f, "constant:{}:{}", copies, format_duration(during))
            }
            Phase::InjectFixed { rate, during } => {
                write!(f, "inject:{}:{}", rate, format_duration(during))
            }
            Phase::InjectRandom {
                min_rate,
                max_rate,
                during,
            } => write!(
                f,
                "inject-random:{}-{}:{}",
                min_rate,
                max_rate,
                format_duration(during)
            ),
        }
    }
}

/// Parses `ramp:<copies>:<dur>`, `constant:<copies>:<dur>`,
/// `inject:<rate>:<dur>` and `inject-random:<min>-<max>:<dur>`.
impl FromStr for Phase {
    type Err = ScheduleError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason: String| ScheduleError::Parse {
            input: input.to_string(),
            reason,
        };

        let parts: Vec<&str> = input.trim().split(':').collect();
        let &[kind, amount, during] = parts.as_slice() else {
            return Err(fail("expected <kind>:<amount>:<duration>".to_string()));
        };

        let during = parse_duration(during).map_err(fail)?;
        let number = |s: &str| -> Result<u64, ScheduleError> {
            s.trim()
                .parse::<u64>()
                .map_err(|_| fail(format!("'{}' is not a non-negative integer", s)))
        };
        let rate = |s: &str| -> Result<u32, ScheduleError> {
            u32::try_from(number(s)?).map_err(|_| fail(format!("rate '{}' is too large", s)))
        };

        let phase = match kind.trim().to_ascii_lowercase().as_str() {
            "ramp" => Phase::ramp(number(amount)? as usize, during),
            "constant" => Phase::constant(number(amount)? as usize, during),
            "inject" => Phase::inject(rate(amount)?, during),
            "inject-random" => {
                let (min, max) = amount
                    .split_once('-')
                    .ok_or_else(|| fail("expected <min>-<max> rate range".to_string()))?;
                Phase::inject_random(rate(min)?, rate(max)?, during)
            }
            other => return Err(fail(format!("unknown phase kind '{}'", other))),
        };

        phase.validate(0)?;
        Ok(phase)
    }
}

/// Ordered, validated, non-empty list of phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Phase>", into = "Vec<Phase>")]
pub struct Schedule {
    phases: Vec<Phase>,
}

impl Schedule {
    pub fn new(phases: Vec<Phase>) -> Result<Self, ScheduleError> {
        if phases.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let mut total = Duration::ZERO;
        for (index, phase) in phases.iter().enumerate() {
            phase.validate(index)?;
            total = total
                .checked_add(phase.during())
                .filter(|total| *total <= MAX_SCHEDULE_DURATION)
                .ok_or(ScheduleError::TooLong {
                    index,
                    limit: MAX_SCHEDULE_DURATION,
                })?;
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Sum of all phase durations, at most [`MAX_SCHEDULE_DURATION`]
    pub fn total_duration(&self) -> Duration {
        self.phases.iter().map(Phase::during).sum()
    }
}

/// Ramp 300 over 10s, hold 900 for 20s, inject 700/s for 10s, then
/// 500-900/s for two minutes.
impl Default for Schedule {
    fn default() -> Self {
        Self {
            phases: vec![
                Phase::ramp(300, Duration::from_secs(10)),
                Phase::constant(900, Duration::from_secs(20)),
                Phase::inject(700, Duration::from_secs(10)),
                Phase::inject_random(500, 900, Duration::from_secs(120)),
            ],
        }
    }
}

impl TryFrom<Vec<Phase>> for Schedule {
    type Error = ScheduleError;

    fn try_from(phases: Vec<Phase>) -> Result<Self, Self::Error> {
        Schedule::new(phases)
    }
}

impl From<Schedule> for Vec<Phase> {
    fn from(schedule: Schedule) -> Self {
        schedule.phases
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phases: Vec<String> = self.phases.iter().map(Phase::to_string).collect();
        write!(f, "{}", phases.join(" -> "))
    }
}
