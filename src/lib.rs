//! Connectivity verification for Subsonic-compatible media servers.
//!
//! Given a [`profile::ServerProfile`], the [`verifier::ConnectivityVerifier`]
//! discovers the protocol version the server speaks, confirms the
//! credentials with an authenticated probe, and reports whether the account
//! is licensed. The HTTP dialect lives in [`api`]; credential encoding in
//! [`auth`]; version arithmetic in [`protocol`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod negotiator;
pub mod profile;
pub mod protocol;
pub mod runtime;
pub mod verifier;

#[cfg(test)]
mod test_helpers;
