//! Connectivity verification sequence.
//!
//! Verification is a linear state machine over three exchanges:
//!
//! 1. **Version probe** — delegated to [`ProtocolNegotiator`]. Refusals are tolerated; only a
//!    probe without a usable response ends the run.
//! 2. **Authenticated probe** — the same ping, presented with the negotiated version so the
//!    credential encoding matches the server. This is the authoritative authentication check.
//! 3. **Licence check** — reports whether the account is licensed.
//!
//! Each exchange starts only after the previous one has completed. The
//! verifier holds no state between runs and never mutates the caller's
//! profile; the discovered version is returned in the
//! [`VerificationReport`] for the caller to persist.

mod handle;

use std::{convert::Infallible, fmt, sync::Arc};

use tracing::{debug, info, warn};

pub use self::handle::{VerificationError, VerificationHandle};
use crate::{
    api::{Connector, ExchangeError, HttpConnector, SubsonicApi},
    negotiator::ProtocolNegotiator,
    profile::ServerProfile,
    protocol::ProtocolVersion,
};

/// Prefix shown before the detail of any failed verification.
pub const FAILURE_PREFIX: &str = "Connection failure.";

/// Classified result of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// All three exchanges succeeded.
    Success {
        /// Licence validity reported by the server.
        licensed: bool,
    },
    /// The authenticated probe was refused.
    AuthenticationFailed {
        /// Displayable cause.
        detail: String,
    },
    /// The server could not be reached or did not answer usefully.
    NetworkError {
        /// Displayable cause.
        detail: String,
    },
    /// The server misbehaved after authentication succeeded.
    ServerError {
        /// Displayable cause.
        detail: String,
    },
}

impl VerificationOutcome {
    /// Returns `true` for [`VerificationOutcome::Success`], licensed or not.
    #[must_use]
    pub const fn is_success(&self) -> bool { matches!(self, Self::Success { .. }) }

    /// Returns `true` when the server was reached but the licence is invalid.
    #[must_use]
    pub const fn is_unlicensed(&self) -> bool { matches!(self, Self::Success { licensed: false }) }

    /// Failure detail, if the run failed.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::AuthenticationFailed { detail }
            | Self::NetworkError { detail }
            | Self::ServerError { detail } => Some(detail),
        }
    }

    /// Message suitable for direct display.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Success { licensed: true } => "Connection OK".to_owned(),
            Self::Success { licensed: false } => {
                "Connection OK, but the server is not licensed".to_owned()
            }
            Self::AuthenticationFailed { detail }
            | Self::NetworkError { detail }
            | Self::ServerError { detail } => format!("{FAILURE_PREFIX} {detail}"),
        }
    }

    fn network(err: &ExchangeError) -> Self {
        Self::NetworkError {
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.message()) }
}

/// Outcome of a run plus the version discovered on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    /// Classified result.
    pub outcome: VerificationOutcome,
    /// Version resolved by the version probe, for the caller to persist.
    pub discovered_version: Option<ProtocolVersion>,
}

/// Position in the verification sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing sent yet.
    Start,
    /// Version probe answered.
    VersionProbed,
    /// Authenticated probe accepted.
    Authenticated,
    /// Licence answered.
    LicenseChecked,
    /// Outcome produced.
    Done,
}

impl Stage {
    const fn next(self) -> Self {
        match self {
            Self::Start => Self::VersionProbed,
            Self::VersionProbed => Self::Authenticated,
            Self::Authenticated => Self::LicenseChecked,
            Self::LicenseChecked | Self::Done => Self::Done,
        }
    }

    /// Classify an exchange failure raised while leaving this stage.
    fn classify(self, err: &ExchangeError) -> VerificationOutcome {
        match (self, err) {
            (_, ExchangeError::Transport { .. }) | (Self::Start, _) => {
                VerificationOutcome::network(err)
            }
            (Self::VersionProbed, ExchangeError::Rejected { .. }) => {
                VerificationOutcome::AuthenticationFailed {
                    detail: err.to_string(),
                }
            }
            _ => VerificationOutcome::ServerError {
                detail: err.to_string(),
            },
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::VersionProbed => "version-probed",
            Self::Authenticated => "authenticated",
            Self::LicenseChecked => "license-checked",
            Self::Done => "done",
        })
    }
}

/// Decides whether a run may continue after an exchange completes.
trait Abandonment {
    type Error;

    fn check(&self, stage: Stage) -> Result<(), Self::Error>;
}

/// Runs driven directly by the caller cannot be abandoned mid-sequence.
struct Attached;

impl Abandonment for Attached {
    type Error = Infallible;

    fn check(&self, _stage: Stage) -> Result<(), Infallible> { Ok(()) }
}

/// Orchestrates the verification sequence against one server at a time.
pub struct ConnectivityVerifier<C = HttpConnector> {
    connector: Arc<C>,
    negotiator: ProtocolNegotiator,
}

impl<C> Clone for ConnectivityVerifier<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            negotiator: self.negotiator,
        }
    }
}

impl<C: Connector> ConnectivityVerifier<C> {
    /// Create a verifier presenting at most `client_max`.
    #[must_use]
    pub fn new(connector: C, client_max: ProtocolVersion) -> Self {
        Self {
            connector: Arc::new(connector),
            negotiator: ProtocolNegotiator::new(client_max),
        }
    }

    /// Run the verification sequence on the current task.
    pub async fn verify(&self, profile: &ServerProfile) -> VerificationReport {
        match self.drive(profile, &Attached).await {
            Ok(report) => report,
            Err(never) => match never {},
        }
    }

    async fn drive<G: Abandonment>(
        &self,
        profile: &ServerProfile,
        gate: &G,
    ) -> Result<VerificationReport, G::Error> {
        let mut stage = Stage::Start;
        debug!(url = %profile.url(), %stage, "verifying server");
        let api = match self.connector.connect(profile) {
            Ok(api) => api,
            Err(err) => return Ok(finish(stage, stage.classify(&err), None)),
        };

        let negotiation = self.negotiator.negotiate(&api).await;
        gate.check(stage)?;
        let negotiation = match negotiation {
            Ok(negotiation) => negotiation,
            Err(err) => return Ok(finish(stage, stage.classify(&err), None)),
        };
        stage = advance(stage);
        let discovered = negotiation.resolved;
        let version = discovered.unwrap_or(self.negotiator.client_max());

        let authenticated = api.ping(version).await;
        gate.check(stage)?;
        if let Err(err) = authenticated {
            return Ok(finish(stage, stage.classify(&err), discovered));
        }
        stage = advance(stage);

        let license = api.license(version).await;
        gate.check(stage)?;
        let outcome = match license {
            Ok(reply) => {
                if !reply.payload.valid {
                    info!(%version, "server reports an invalid licence");
                }
                stage = advance(stage);
                VerificationOutcome::Success {
                    licensed: reply.payload.valid,
                }
            }
            Err(err) => stage.classify(&err),
        };
        Ok(finish(stage, outcome, discovered))
    }
}

impl<C> ConnectivityVerifier<C>
where
    C: Connector + 'static,
    C::Api: 'static,
{
    /// Run the verification sequence on a background task.
    ///
    /// The returned handle delivers the report exactly once. Cancelling or
    /// dropping it lets the in-flight exchange finish, then discards the
    /// run without reporting anything.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime, like [`tokio::spawn`].
    #[must_use]
    pub fn spawn(&self, profile: ServerProfile) -> VerificationHandle {
        handle::spawn(self.clone(), profile)
    }
}

fn advance(stage: Stage) -> Stage {
    let next = stage.next();
    debug!(from = %stage, to = %next, "verification stage advanced");
    next
}

fn finish(
    stage: Stage,
    outcome: VerificationOutcome,
    discovered_version: Option<ProtocolVersion>,
) -> VerificationReport {
    debug!(from = %stage, to = %Stage::Done, "verification stage advanced");
    match outcome.detail() {
        Some(detail) => warn!(%stage, detail, "verification failed"),
        None => info!(
            version = ?discovered_version.map(|version| version.to_string()),
            unlicensed = outcome.is_unlicensed(),
            "verification succeeded"
        ),
    }
    VerificationReport {
        outcome,
        discovered_version,
    }
}
