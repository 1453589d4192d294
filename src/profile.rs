//! Server profiles supplied by callers for verification.
//!
//! A profile is the caller-owned description of one server: where it lives,
//! which credentials to present and how strict the transport should be. The
//! verifier only ever reads a snapshot; writing the negotiated version back
//! is left to the caller through [`ServerProfile::record_discovered_version`].

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::{protocol::ProtocolVersion, verifier::VerificationReport};

/// Errors raised when a profile URL cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    /// The address is empty or whitespace.
    #[error("server address is required")]
    MissingUrl,
    /// The address carries leading or trailing whitespace.
    #[error("server address {0:?} contains surrounding whitespace")]
    Whitespace(String),
    /// The address is not an absolute URL.
    #[error("invalid server address {address:?}: {reason}")]
    InvalidUrl {
        /// Address as supplied.
        address: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The scheme is neither `http` nor `https`.
    #[error("unsupported scheme {0:?}; expected http or https")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("server address {0:?} has no host")]
    MissingHost(String),
}

/// When a stored, negotiated version is discarded on edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenegotiationPolicy {
    /// Forget the negotiated version whenever the profile is edited.
    #[default]
    Always,
    /// Keep the cached version across edits.
    KeepCached,
}

/// Connection settings for one server.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerProfile {
    url: Url,
    username: String,
    password: String,
    allow_self_signed_certificate: bool,
    ldap_support: bool,
    minimum_api_version: Option<ProtocolVersion>,
}

impl ServerProfile {
    /// Build a profile after validating the server address.
    ///
    /// The password may be empty; whether that is acceptable is up to the
    /// server.
    ///
    /// # Errors
    /// Returns [`ProfileError`] if the address is not an absolute `http` or
    /// `https` URL with a host.
    pub fn new(
        url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ProfileError> {
        Ok(Self {
            url: parse_server_url(url)?,
            username: username.into(),
            password: password.into(),
            allow_self_signed_certificate: false,
            ldap_support: false,
            minimum_api_version: None,
        })
    }

    /// Relax certificate validation for this server only.
    #[must_use]
    pub const fn with_self_signed_certificate(mut self, allow: bool) -> Self {
        self.allow_self_signed_certificate = allow;
        self
    }

    /// Mark the account as LDAP-backed, forcing password authentication.
    #[must_use]
    pub const fn with_ldap_support(mut self, enabled: bool) -> Self {
        self.ldap_support = enabled;
        self
    }

    /// Seed a previously negotiated version, e.g. when loading from storage.
    #[must_use]
    pub const fn with_minimum_api_version(mut self, version: Option<ProtocolVersion>) -> Self {
        self.minimum_api_version = version;
        self
    }

    /// Base address of the server.
    #[must_use]
    pub const fn url(&self) -> &Url { &self.url }

    /// Account name.
    #[must_use]
    pub fn username(&self) -> &str { &self.username }

    /// Account password.
    #[must_use]
    pub fn password(&self) -> &str { &self.password }

    /// Whether self-signed certificates are trusted for this server.
    #[must_use]
    pub const fn allow_self_signed_certificate(&self) -> bool {
        self.allow_self_signed_certificate
    }

    /// Whether the LDAP authentication hint is enabled.
    #[must_use]
    pub const fn ldap_support(&self) -> bool { self.ldap_support }

    /// Version recorded by the last successful negotiation, if any.
    #[must_use]
    pub const fn minimum_api_version(&self) -> Option<ProtocolVersion> {
        self.minimum_api_version
    }

    /// Persist the version discovered by a verification run.
    ///
    /// Returns `true` if the stored version changed. Reports without a
    /// discovered version leave the profile untouched.
    pub fn record_discovered_version(&mut self, report: &VerificationReport) -> bool {
        let Some(discovered) = report.discovered_version else {
            return false;
        };
        let changed = self.minimum_api_version != Some(discovered);
        self.minimum_api_version = Some(discovered);
        changed
    }

    /// Prepare the profile for editing.
    ///
    /// Under [`RenegotiationPolicy::Always`] the negotiated version is
    /// cleared so that the next verification negotiates afresh.
    pub fn begin_edit(&mut self, policy: RenegotiationPolicy) {
        if policy == RenegotiationPolicy::Always {
            self.minimum_api_version = None;
        }
    }
}

impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field(
                "allow_self_signed_certificate",
                &self.allow_self_signed_certificate,
            )
            .field("ldap_support", &self.ldap_support)
            .field("minimum_api_version", &self.minimum_api_version)
            .finish()
    }
}

fn parse_server_url(address: &str) -> Result<Url, ProfileError> {
    if address.trim().is_empty() {
        return Err(ProfileError::MissingUrl);
    }
    if address.trim() != address {
        return Err(ProfileError::Whitespace(address.to_owned()));
    }
    let url = Url::parse(address).map_err(|err| ProfileError::InvalidUrl {
        address: address.to_owned(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProfileError::UnsupportedScheme(url.scheme().to_owned()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProfileError::MissingHost(address.to_owned()));
    }
    Ok(url)
}
