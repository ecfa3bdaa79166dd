//! Testing utilities for the Surge load harness.
//!
//! This crate provides a simulated backend so harness runs can be exercised
//! without a running document store.

pub mod simulated;

pub use simulated::*;
