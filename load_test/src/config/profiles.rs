use super::harness::{ConfigError, HarnessConfig};
use crate::schedule::{Phase, Schedule};
use std::time::Duration;

/// Profile names and one-line descriptions
pub const PROFILES: &[(&str, &str)] = &[
    (
        "original",
        "ramp to 300, hold 900, inject 700/s, then 500-900/s for 2m (ceiling 120)",
    ),
    ("smoke", "short low-volume run to check connectivity"),
    ("soak", "sustained mixed load over fifteen minutes"),
];

/// Get a harness configuration by profile name
pub fn get_profile(profile: &str) -> Result<HarnessConfig, ConfigError> {
    match profile {
        "original" => Ok(original_profile()),
        "smoke" => Ok(smoke_profile()),
        "soak" => Ok(soak_profile()),
        other => Err(ConfigError::UnknownProfile(other.to_string())),
    }
}

/// The reference run:
/// - 120 operations in flight at most, 1s per-operation timeout
/// - pool of 8 to 12 connections, send queue of 4096
/// - 5s settle after dropping and recreating the target
pub fn original_profile() -> HarnessConfig {
    HarnessConfig::default()
}

/// Quick connectivity check:
/// - ceiling 16, 10 concurrent writers then 20/s injected
/// - no settle delay, short drain
pub fn smoke_profile() -> HarnessConfig {
    HarnessConfig {
        max_in_flight: 16,
        settle_delay: Duration::ZERO,
        drain_grace: Duration::from_secs(2),
        schedule: schedule(vec![
            Phase::ramp(10, Duration::from_secs(5)),
            Phase::constant(10, Duration::from_secs(10)),
            Phase::inject(20, Duration::from_secs(5)),
        ]),
        ..HarnessConfig::default()
    }
}

/// Long run for spotting degradation over time:
/// - ramp to 200 writers and hold for ten minutes
/// - then randomized injection between 100/s and 300/s for five minutes
pub fn soak_profile() -> HarnessConfig {
    HarnessConfig {
        drain_grace: Duration::from_secs(30),
        schedule: schedule(vec![
            Phase::ramp(200, Duration::from_secs(30)),
            Phase::constant(200, Duration::from_secs(600)),
            Phase::inject_random(100, 300, Duration::from_secs(300)),
        ]),
        ..HarnessConfig::default()
    }
}

fn schedule(phases: Vec<Phase>) -> Schedule {
    // Built from constants; a failure here is a programming error
    Schedule::new(phases).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_profile_is_valid() {
        for (name, _) in PROFILES {
            let config = get_profile(name).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_profile() {
        assert!(matches!(
            get_profile("turbo"),
            Err(ConfigError::UnknownProfile(name)) if name == "turbo"
        ));
    }

    #[test]
    fn test_smoke_profile_is_short() {
        let config = smoke_profile();
        assert_eq!(config.schedule.total_duration(), Duration::from_secs(20));
        assert_ne!(config.schedule, Schedule::default());
    }
}
