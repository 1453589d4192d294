//! Protocol version discovery.
//!
//! The negotiator issues the exploratory ping with the client's maximum
//! version and reads back the version the server advertises. Servers report
//! their version on refusals too, so a rejected probe (wrong credentials, a
//! token sent to a server that predates tokens) still yields a version.
//! Only failures that leave no usable response end negotiation.

use tracing::{debug, info};

use crate::{
    api::{ExchangeError, SubsonicApi},
    protocol::{ProtocolVersion, resolve_closest_version},
};

/// Result of the exploratory probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    /// Version advertised by the server, if it sent a parseable one.
    pub advertised: Option<ProtocolVersion>,
    /// Known version to use for the rest of the session, if resolvable.
    pub resolved: Option<ProtocolVersion>,
    /// Refusal received on the probe; informational only.
    pub rejection: Option<ExchangeError>,
}

/// Resolves the protocol version to present to one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolNegotiator {
    client_max: ProtocolVersion,
}

impl ProtocolNegotiator {
    /// Create a negotiator for a client speaking at most `client_max`.
    #[must_use]
    pub const fn new(client_max: ProtocolVersion) -> Self { Self { client_max } }

    /// Highest version this client presents.
    #[must_use]
    pub const fn client_max(&self) -> ProtocolVersion { self.client_max }

    /// Probe the server and resolve the session version.
    ///
    /// # Errors
    /// Returns the [`ExchangeError`] when the probe produced no usable
    /// response (transport failure or malformed body). Rejections are not
    /// errors here.
    pub async fn negotiate<A>(&self, api: &A) -> Result<Negotiation, ExchangeError>
    where
        A: SubsonicApi + ?Sized,
    {
        let (advertised, rejection) = match api.ping(self.client_max).await {
            Ok(reply) => (reply.server_version, None),
            Err(ExchangeError::Rejected {
                server_version,
                reason,
            }) => {
                debug!(%reason, "exploratory probe rejected; continuing with version discovery");
                (
                    server_version,
                    Some(ExchangeError::Rejected {
                        server_version,
                        reason,
                    }),
                )
            }
            Err(err) => return Err(err),
        };
        let resolved = advertised.and_then(|server| resolve_closest_version(self.client_max, server));
        match (advertised, resolved) {
            (Some(server), Some(version)) => {
                info!(%server, %version, "server minimum API version resolved");
            }
            (Some(server), None) => {
                info!(%server, "server version predates every known version");
            }
            (None, _) => debug!("server did not advertise a protocol version"),
        }
        Ok(Negotiation {
            advertised,
            resolved,
            rejection,
        })
    }
}
