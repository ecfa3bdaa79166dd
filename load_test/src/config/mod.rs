pub mod harness;
pub mod profiles;

pub use harness::{ConfigError, HarnessConfig, RetryConfig};
pub use profiles::{get_profile, PROFILES};
