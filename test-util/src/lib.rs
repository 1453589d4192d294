//! Utilities for integration tests.
//!
//! The `test-util` crate provides an in-process stub of a Subsonic-compatible
//! server. An `axum` router answers `ping.view` and `getLicense.view` over
//! plain HTTP or self-signed HTTPS, validates credentials the way a real
//! server does, and records every request so tests can assert on the
//! exchanges.

pub mod server;

pub use server::{Fault, LicenseReply, RecordedRequest, StubConfig, StubServer};
