//! Client side of the two REST calls used during verification.
//!
//! The verifier talks to servers through the [`SubsonicApi`] port so the
//! sequencing logic can be exercised without a network. [`http`] provides
//! the production adapter; [`Connector`] builds one adapter per profile,
//! since credentials and TLS policy are fixed for the life of a client.

pub mod envelope;
pub mod errors;
pub mod http;

use async_trait::async_trait;
use serde::Deserialize;

pub use self::{
    errors::{ApiError, ApiErrorCode, ExchangeError, Rejection},
    http::{ClientSettings, HttpApi, HttpConnector},
};
use crate::{profile::ServerProfile, protocol::ProtocolVersion};

/// Successful response together with the version the server advertised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    /// Version from the response envelope, if it parsed.
    pub server_version: Option<ProtocolVersion>,
    /// Call-specific payload.
    pub payload: T,
}

/// Payload of a successful ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong;

/// Licence details returned by the licence call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Whether the account is licensed.
    pub valid: bool,
    /// Licence holder, when disclosed.
    pub email: Option<String>,
    /// Licence expiry timestamp as sent by the server.
    pub license_expires: Option<String>,
    /// Trial expiry timestamp as sent by the server.
    pub trial_expires: Option<String>,
}

/// Port for the REST calls issued by the verifier.
///
/// `version` is the protocol version presented on the request; adapters
/// also derive the credential encoding from it.
#[async_trait]
pub trait SubsonicApi: Send + Sync {
    /// Issue the lightweight liveness probe.
    ///
    /// # Errors
    /// Returns [`ExchangeError`] describing the transport failure, rejection
    /// or malformed response.
    async fn ping(&self, version: ProtocolVersion) -> Result<Reply<Pong>, ExchangeError>;

    /// Ask whether the authenticated account is licensed.
    ///
    /// # Errors
    /// Returns [`ExchangeError`] describing the transport failure, rejection
    /// or malformed response.
    async fn license(&self, version: ProtocolVersion) -> Result<Reply<License>, ExchangeError>;
}

/// Builds an API client bound to one profile.
pub trait Connector: Send + Sync {
    /// Adapter produced for a profile.
    type Api: SubsonicApi;

    /// Create a client for `profile`.
    ///
    /// # Errors
    /// Returns [`ExchangeError::Transport`] when the underlying client
    /// cannot be constructed.
    fn connect(&self, profile: &ServerProfile) -> Result<Self::Api, ExchangeError>;
}
