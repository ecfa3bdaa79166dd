//! Traffic shaper: maps elapsed run time onto a load target.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::phase::{Phase, Schedule};

/// What the driver should sustain at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTarget {
    /// Keep this many looping workers busy
    Concurrency(usize),
    /// Start this many new operations per second
    Rate(u32),
}

#[derive(Debug, Clone)]
struct ScheduledPhase {
    phase: Phase,
    start: Duration,
    /// Concurrency a ramp starts from
    ramp_from: usize,
    /// Per-second rates for `InjectRandom`, empty otherwise
    rates: Vec<u32>,
}

/// Resolves a [`Schedule`] against elapsed time.
///
/// Randomized rates are drawn once, in phase order, when the shaper is
/// built, so the same schedule and seed always produce the same sequence.
#[derive(Debug, Clone)]
pub struct TrafficShaper {
    phases: Vec<ScheduledPhase>,
    total: Duration,
    seed: u64,
}

impl TrafficShaper {
    pub fn new(schedule: &Schedule, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut phases = Vec::with_capacity(schedule.phases().len());
        let mut start = Duration::ZERO;
        let mut level = 0;

        for phase in schedule.phases() {
            let rates = match *phase {
                Phase::InjectRandom {
                    min_rate,
                    max_rate,
                    during,
                } => {
                    let seconds = during.as_secs_f64().ceil().max(1.0) as usize;
                    (0..seconds)
                        .map(|_| rng.gen_range(min_rate..=max_rate))
                        .collect()
                }
                _ => Vec::new(),
            };

            phases.push(ScheduledPhase {
                phase: *phase,
                start,
                ramp_from: level,
                rates,
            });
            // Bounded by MAX_SCHEDULE_DURATION once the schedule is built
            start = start.saturating_add(phase.during());
            level = phase.final_concurrency();
        }

        Self {
            phases,
            total: start,
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Index and phase active at `elapsed`; at a boundary the later phase
    /// is active. `None` once the schedule is exhausted.
    pub fn phase_at(&self, elapsed: Duration) -> Option<(usize, &Phase)> {
        self.locate(elapsed)
            .map(|index| (index, &self.phases[index].phase))
    }

    /// Target load at `elapsed`, or `None` once the schedule is exhausted
    pub fn target_at(&self, elapsed: Duration) -> Option<LoadTarget> {
        let index = self.locate(elapsed)?;
        let scheduled = &self.phases[index];
        let offset = elapsed - scheduled.start;

        let target = match scheduled.phase {
            Phase::Ramp { copies, during } => {
                let from = scheduled.ramp_from as f64;
                let progress = offset.as_secs_f64() / during.as_secs_f64();
                let value = from + (copies as f64 - from) * progress;
                LoadTarget::Concurrency(value.round().max(0.0) as usize)
            }
            Phase::Constant { copies, .. } => LoadTarget::Concurrency(copies),
            Phase::InjectFixed { rate, .. } => LoadTarget::Rate(rate),
            Phase::InjectRandom { .. } => {
                let second = (offset.as_secs() as usize).min(scheduled.rates.len() - 1);
                LoadTarget::Rate(scheduled.rates[second])
            }
        };
        Some(target)
    }

    /// Pre-drawn per-second rates of every `InjectRandom` phase, in order
    pub fn random_rates(&self) -> Vec<&[u32]> {
        self.phases
            .iter()
            .filter(|p| matches!(p.phase, Phase::InjectRandom { .. }))
            .map(|p| p.rates.as_slice())
            .collect()
    }

    fn locate(&self, elapsed: Duration) -> Option<usize> {
        if elapsed >= self.total {
            return None;
        }
        // Last phase whose start is at or before `elapsed`
        let index = self.phases.partition_point(|p| p.start <= elapsed);
        index.checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_boundaries_activate_next_phase() {
        let schedule = Schedule::new(vec![
            Phase::constant(5, secs(2)),
            Phase::inject(40, secs(1)),
        ])
        .unwrap();
        let shaper = TrafficShaper::new(&schedule, 0);

        assert_eq!(
            shaper.target_at(Duration::ZERO),
            Some(LoadTarget::Concurrency(5))
        );
        assert_eq!(
            shaper.target_at(Duration::from_millis(1999)),
            Some(LoadTarget::Concurrency(5))
        );
        assert_eq!(shaper.target_at(secs(2)), Some(LoadTarget::Rate(40)));
        assert_eq!(shaper.phase_at(secs(2)).map(|(i, _)| i), Some(1));
        assert_eq!(shaper.target_at(secs(3)), None);
        assert_eq!(shaper.total_duration(), secs(3));
    }

    #[test]
    fn test_ramp_starts_from_previous_level() {
        let schedule = Schedule::new(vec![
            Phase::constant(10, secs(1)),
            Phase::ramp(20, secs(10)),
            Phase::inject(5, secs(1)),
            Phase::ramp(4, secs(4)),
        ])
        .unwrap();
        let shaper = TrafficShaper::new(&schedule, 0);

        assert_eq!(shaper.target_at(secs(1)), Some(LoadTarget::Concurrency(10)));
        assert_eq!(shaper.target_at(secs(6)), Some(LoadTarget::Concurrency(15)));
        // After an injection phase a ramp starts from zero
        assert_eq!(shaper.target_at(secs(12)), Some(LoadTarget::Concurrency(0)));
        assert_eq!(shaper.target_at(secs(14)), Some(LoadTarget::Concurrency(2)));
    }

    #[test]
    fn test_ramp_down() {
        let schedule =
            Schedule::new(vec![Phase::constant(8, secs(1)), Phase::ramp(0, secs(4))]).unwrap();
        let shaper = TrafficShaper::new(&schedule, 0);
        assert_eq!(shaper.target_at(secs(3)), Some(LoadTarget::Concurrency(4)));
    }

    #[test]
    fn test_random_rates_within_bounds() {
        let schedule = Schedule::new(vec![Phase::inject_random(5, 9, secs(30))]).unwrap();
        let shaper = TrafficShaper::new(&schedule, 7);

        let rates = shaper.random_rates();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].len(), 30);
        assert!(rates[0].iter().all(|r| (5..=9).contains(r)));

        for second in 0..30 {
            let at = secs(second) + Duration::from_millis(500);
            assert_eq!(
                shaper.target_at(at),
                Some(LoadTarget::Rate(rates[0][second as usize]))
            );
        }
    }

    #[test]
    fn test_longest_random_phase_has_one_rate_per_second() {
        use crate::schedule::MAX_SCHEDULE_DURATION;

        let schedule =
            Schedule::new(vec![Phase::inject_random(1, 2, MAX_SCHEDULE_DURATION)]).unwrap();
        let shaper = TrafficShaper::new(&schedule, 5);
        assert_eq!(
            shaper.random_rates()[0].len() as u64,
            MAX_SCHEDULE_DURATION.as_secs()
        );
        assert_eq!(shaper.total_duration(), MAX_SCHEDULE_DURATION);
        assert!(shaper.target_at(MAX_SCHEDULE_DURATION - secs(1)).is_some());
    }

    #[test]
    fn test_fractional_random_phase_covers_last_second() {
        let schedule =
            Schedule::new(vec![Phase::inject_random(1, 3, Duration::from_millis(1500))]).unwrap();
        let shaper = TrafficShaper::new(&schedule, 1);
        assert_eq!(shaper.random_rates()[0].len(), 2);
        assert!(shaper.target_at(Duration::from_millis(1400)).is_some());
    }
}
