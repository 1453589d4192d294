//! Constants and helpers for the Subsonic REST dialect.
//!
//! The protocol module defines the versions this client understands, the
//! endpoints used by the verification sequence and the "closest known
//! version" resolution that keeps every request inside a dialect the client
//! can actually speak.
use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client identifier sent in the `c` query parameter by default.
pub const CLIENT_ID: &str = "sonar";
/// Highest protocol version requested when nothing else is configured.
pub const DEFAULT_CLIENT_VERSION: ProtocolVersion = ProtocolVersion::new(1, 16, 1);
/// First version whose servers accept salted-token authentication.
pub const TOKEN_AUTH_MIN_VERSION: ProtocolVersion = ProtocolVersion::new(1, 13, 0);
/// Response format requested from the server.
pub const RESPONSE_FORMAT: &str = "json";
/// Default overall timeout for a single exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint used for the liveness and authentication probes.
pub const PING_ENDPOINT: &str = "ping.view";
/// Endpoint used for the licence check.
pub const LICENSE_ENDPOINT: &str = "getLicense.view";

/// Protocol versions understood by this client, in ascending order.
pub const KNOWN_VERSIONS: &[ProtocolVersion] = &[
    ProtocolVersion::new(1, 1, 0),
    ProtocolVersion::new(1, 1, 1),
    ProtocolVersion::new(1, 2, 0),
    ProtocolVersion::new(1, 3, 0),
    ProtocolVersion::new(1, 4, 0),
    ProtocolVersion::new(1, 5, 0),
    ProtocolVersion::new(1, 6, 0),
    ProtocolVersion::new(1, 7, 0),
    ProtocolVersion::new(1, 8, 0),
    ProtocolVersion::new(1, 9, 0),
    ProtocolVersion::new(1, 10, 2),
    ProtocolVersion::new(1, 11, 0),
    ProtocolVersion::new(1, 12, 0),
    ProtocolVersion::new(1, 13, 0),
    ProtocolVersion::new(1, 14, 0),
    ProtocolVersion::new(1, 15, 0),
    ProtocolVersion::new(1, 16, 0),
    ProtocolVersion::new(1, 16, 1),
];

/// A REST API dialect version, ordered by `(major, minor, patch)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    /// Major component.
    pub major: u16,
    /// Minor component.
    pub minor: u16,
    /// Patch component.
    pub patch: u16,
}

impl ProtocolVersion {
    /// Build a version from its components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Return the greatest known version that does not exceed `self`.
    #[must_use]
    pub fn closest_known(self) -> Option<Self> {
        KNOWN_VERSIONS.iter().copied().filter(|known| *known <= self).max()
    }

    /// Returns `true` if this version appears in [`KNOWN_VERSIONS`].
    #[must_use]
    pub fn is_known(self) -> bool { KNOWN_VERSIONS.contains(&self) }

    /// Returns `true` if servers speaking this version accept token auth.
    #[must_use]
    pub fn supports_token_auth(self) -> bool { self >= TOKEN_AUTH_MIN_VERSION }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Errors raised while parsing a [`ProtocolVersion`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    /// The input did not contain two or three dot-separated components.
    #[error("malformed protocol version {0:?}")]
    Malformed(String),
    /// A component was not a valid unsigned integer.
    #[error("invalid component {component:?} in protocol version {input:?}")]
    InvalidComponent {
        /// Full input string.
        input: String,
        /// Offending component.
        component: String,
    },
    /// The configured version lies below every version this client knows.
    #[error("protocol version {0} is older than any version this client supports")]
    Unsupported(ProtocolVersion),
}

impl FromStr for ProtocolVersion {
    type Err = VersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.trim().split('.').collect();
        let component = |text: &str| {
            text.parse::<u16>()
                .map_err(|_| VersionError::InvalidComponent {
                    input: input.to_owned(),
                    component: text.to_owned(),
                })
        };
        match parts.as_slice() {
            [major, minor] => Ok(Self::new(component(major)?, component(minor)?, 0)),
            [major, minor, patch] => Ok(Self::new(
                component(major)?,
                component(minor)?,
                component(patch)?,
            )),
            _ => Err(VersionError::Malformed(input.to_owned())),
        }
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<ProtocolVersion> for String {
    fn from(value: ProtocolVersion) -> Self { value.to_string() }
}

/// Resolve the version to use against a server.
///
/// Returns the greatest entry of [`KNOWN_VERSIONS`] that is less than or
/// equal to both the client maximum and the server-advertised version, or
/// `None` when the server is older than anything the client speaks.
#[must_use]
pub fn resolve_closest_version(
    client_max: ProtocolVersion,
    server: ProtocolVersion,
) -> Option<ProtocolVersion> {
    client_max.min(server).closest_known()
}

/// Parse a configured client maximum and pin it to a known version.
///
/// # Errors
/// Returns an error if the string does not parse or lies below every known
/// version.
pub fn client_version_from_config(raw: &str) -> Result<ProtocolVersion, VersionError> {
    let requested: ProtocolVersion = raw.parse()?;
    requested
        .closest_known()
        .ok_or(VersionError::Unsupported(requested))
}
