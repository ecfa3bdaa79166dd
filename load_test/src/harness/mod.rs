//! Orchestration of a load run

pub mod driver;
pub mod workers;

pub use driver::{Harness, HarnessState};
pub use workers::{ClosedLoopPool, Injector, Launcher};
