//! Core types for the Surge load harness.
//!
//! This crate holds the pieces shared by the harness and by backend
//! implementations: the backend error taxonomy and the request/target types.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
