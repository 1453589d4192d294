//! Background verification runs with single-fire completion.

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Abandonment, ConnectivityVerifier, Stage, VerificationReport};
use crate::{api::Connector, profile::ServerProfile};

/// Errors reported by [`VerificationHandle::outcome`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The run was cancelled, or its task ended without reporting.
    #[error("verification abandoned before completion")]
    Abandoned,
}

/// Marker returned when a cancelled run stops between exchanges.
#[derive(Debug)]
pub(super) struct Abandoned;

impl Abandonment for CancellationToken {
    type Error = Abandoned;

    fn check(&self, stage: Stage) -> Result<(), Abandoned> {
        if self.is_cancelled() {
            debug!(%stage, "verification abandoned; discarding exchange result");
            Err(Abandoned)
        } else {
            Ok(())
        }
    }
}

/// Caller side of a background verification run.
///
/// Dropping the handle, or the future returned by
/// [`VerificationHandle::outcome`], cancels the run.
#[derive(Debug)]
pub struct VerificationHandle {
    receiver: Option<oneshot::Receiver<VerificationReport>>,
    token: CancellationToken,
}

impl VerificationHandle {
    /// Abandon the run. No report will be delivered afterwards.
    pub fn cancel(&self) { self.token.cancel(); }

    /// Returns `true` once the run has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    /// Wait for the report.
    ///
    /// # Errors
    /// Returns [`VerificationError::Abandoned`] if the run was cancelled or
    /// its task terminated without reporting.
    pub async fn outcome(mut self) -> Result<VerificationReport, VerificationError> {
        let receiver = self.receiver.take().ok_or(VerificationError::Abandoned)?;
        let report = receiver.await.map_err(|_| VerificationError::Abandoned)?;
        if self.token.is_cancelled() {
            return Err(VerificationError::Abandoned);
        }
        Ok(report)
    }
}

impl Drop for VerificationHandle {
    fn drop(&mut self) { self.token.cancel(); }
}

pub(super) fn spawn<C>(verifier: ConnectivityVerifier<C>, profile: ServerProfile) -> VerificationHandle
where
    C: Connector + 'static,
    C::Api: 'static,
{
    let (sender, receiver) = oneshot::channel();
    let token = CancellationToken::new();
    let run_token = token.clone();
    tokio::spawn(async move {
        let Ok(report) = verifier.drive(&profile, &run_token).await else {
            return;
        };
        if run_token.is_cancelled() || sender.send(report).is_err() {
            debug!("verification finished after the caller went away; report discarded");
        }
    });
    VerificationHandle {
        receiver: Some(receiver),
        token,
    }
}
