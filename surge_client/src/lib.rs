//! Backend client layer for the Surge load harness.
//!
//! This crate defines how the harness talks to a backend: the
//! [`Connector`]/[`Session`]/[`Provisioner`] traits, the connection options
//! passed through to a connector, a retry policy for setup-time calls, and
//! an HTTP document-store connector.

pub mod http;
pub mod options;
pub mod retry;
pub mod session;

pub use http::{HttpConnector, HttpSession};
pub use options::*;
pub use retry::*;
pub use session::*;
