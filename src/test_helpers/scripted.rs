//! Scripted in-memory API for exercising the verification sequence.
//!
//! Each endpoint replays a queue of [`Step`]s and every call is recorded, so
//! tests can assert both the outcome and exactly which exchanges happened.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::{
    api::{
        ApiError,
        ApiErrorCode,
        Connector,
        ExchangeError,
        License,
        Pong,
        Reply,
        SubsonicApi,
    },
    profile::ServerProfile,
    protocol::ProtocolVersion,
};

/// Endpoint hit by a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Ping,
    License,
}

/// One recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Call {
    pub(crate) endpoint: Endpoint,
    pub(crate) version: ProtocolVersion,
}

/// Scripted response for one call.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Ok {
        server_version: Option<ProtocolVersion>,
        licensed: bool,
    },
    Fail(ExchangeError),
}

fn version(raw: &str) -> ProtocolVersion { raw.parse().expect("scripted version parses") }

impl Step {
    pub(crate) fn ok(server_version: &str) -> Self {
        Self::Ok {
            server_version: Some(version(server_version)),
            licensed: true,
        }
    }

    pub(crate) const fn ok_unversioned() -> Self {
        Self::Ok {
            server_version: None,
            licensed: true,
        }
    }

    pub(crate) fn license(valid: bool) -> Self {
        Self::Ok {
            server_version: Some(version("1.16.0")),
            licensed: valid,
        }
    }

    pub(crate) fn api(code: u32, server_version: &str) -> Self {
        Self::Fail(ExchangeError::api(
            Some(version(server_version)),
            ApiError {
                code: ApiErrorCode::from(code),
                message: None,
            },
        ))
    }

    pub(crate) fn wrong_credentials(server_version: &str) -> Self {
        Self::api(40, server_version)
    }

    pub(crate) const fn http(status: u16) -> Self {
        Self::Fail(ExchangeError::http(status, None))
    }

    pub(crate) fn transport(detail: &str) -> Self {
        Self::Fail(ExchangeError::Transport {
            detail: detail.to_owned(),
        })
    }

    pub(crate) fn malformed(detail: &str) -> Self { Self::Fail(ExchangeError::malformed(detail)) }
}

#[derive(Default)]
struct Script {
    pings: Mutex<VecDeque<Step>>,
    licenses: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    connect_error: Mutex<Option<ExchangeError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    started: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-memory [`SubsonicApi`] and [`Connector`] replaying scripted steps.
#[derive(Clone, Default)]
pub(crate) struct ScriptedApi {
    script: Arc<Script>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self { Self::default() }

    pub(crate) fn ping(self, step: Step) -> Self {
        lock(&self.script.pings).push_back(step);
        self
    }

    pub(crate) fn license(self, step: Step) -> Self {
        lock(&self.script.licenses).push_back(step);
        self
    }

    pub(crate) fn refuse_connect(self, detail: &str) -> Self {
        *lock(&self.script.connect_error) = Some(ExchangeError::Transport {
            detail: detail.to_owned(),
        });
        self
    }

    /// Hold every call until a permit is added to the returned semaphore.
    pub(crate) fn gated(self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        *lock(&self.script.gate) = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Wait until a call has been recorded.
    pub(crate) async fn call_started(&self) { self.script.started.notified().await; }

    pub(crate) fn calls(&self) -> Vec<Call> { lock(&self.script.calls).clone() }

    async fn replay(&self, endpoint: Endpoint, version: ProtocolVersion) -> Step {
        lock(&self.script.calls).push(Call { endpoint, version });
        self.script.started.notify_one();
        let gate = lock(&self.script.gate).clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let queue = match endpoint {
            Endpoint::Ping => &self.script.pings,
            Endpoint::License => &self.script.licenses,
        };
        lock(queue).pop_front().unwrap_or_else(|| {
            Step::transport(&format!("no scripted response for {endpoint:?}"))
        })
    }
}

#[async_trait]
impl SubsonicApi for ScriptedApi {
    async fn ping(&self, version: ProtocolVersion) -> Result<Reply<Pong>, ExchangeError> {
        match self.replay(Endpoint::Ping, version).await {
            Step::Ok { server_version, .. } => Ok(Reply {
                server_version,
                payload: Pong,
            }),
            Step::Fail(err) => Err(err),
        }
    }

    async fn license(&self, version: ProtocolVersion) -> Result<Reply<License>, ExchangeError> {
        match self.replay(Endpoint::License, version).await {
            Step::Ok {
                server_version,
                licensed,
            } => Ok(Reply {
                server_version,
                payload: License {
                    valid: licensed,
                    email: None,
                    license_expires: None,
                    trial_expires: None,
                },
            }),
            Step::Fail(err) => Err(err),
        }
    }
}

impl Connector for ScriptedApi {
    type Api = Self;

    fn connect(&self, _profile: &ServerProfile) -> Result<Self, ExchangeError> {
        match lock(&self.script.connect_error).clone() {
            Some(err) => Err(err),
            None => Ok(self.clone()),
        }
    }
}
