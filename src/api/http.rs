//! `reqwest` adapter for the REST calls.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{
    Connector,
    License,
    Pong,
    Reply,
    SubsonicApi,
    envelope::{Payload, decode_reply},
    errors::ExchangeError,
};
use crate::{
    auth::Credentials,
    profile::ServerProfile,
    protocol::{
        CLIENT_ID,
        DEFAULT_TIMEOUT,
        LICENSE_ENDPOINT,
        PING_ENDPOINT,
        ProtocolVersion,
        RESPONSE_FORMAT,
    },
};

/// Client-wide settings shared by every profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Value sent as the `c` parameter.
    pub client_id: String,
    /// Overall timeout applied to each exchange.
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Builds [`HttpApi`] clients honouring each profile's TLS policy.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    settings: ClientSettings,
}

impl HttpConnector {
    /// Create a connector with the given settings.
    #[must_use]
    pub const fn new(settings: ClientSettings) -> Self { Self { settings } }
}

impl Connector for HttpConnector {
    type Api = HttpApi;

    fn connect(&self, profile: &ServerProfile) -> Result<HttpApi, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(self.settings.timeout)
            .user_agent(format!(
                "{}/{}",
                self.settings.client_id,
                env!("CARGO_PKG_VERSION")
            ))
            .danger_accept_invalid_certs(profile.allow_self_signed_certificate())
            .build()
            .map_err(|err| ExchangeError::transport(&err))?;
        Ok(HttpApi {
            client,
            base: profile.url().clone(),
            client_id: self.settings.client_id.clone(),
            credentials: Credentials::new(
                profile.username().to_owned(),
                profile.password().to_owned(),
                profile.ldap_support(),
            ),
        })
    }
}

/// REST client bound to one server and one set of credentials.
pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
    client_id: String,
    credentials: Credentials,
}

impl HttpApi {
    fn endpoint(&self, name: &str, version: ProtocolVersion) -> Result<Url, ExchangeError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ExchangeError::Transport {
                detail: format!("server address {} cannot carry a path", self.base),
            })?
            .pop_if_empty()
            .extend(["rest", name]);
        let auth = self
            .credentials
            .query_pairs(version, &mut rand::thread_rng());
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("u", self.credentials.username())
                .append_pair("v", &version.to_string())
                .append_pair("c", &self.client_id)
                .append_pair("f", RESPONSE_FORMAT);
            for (name, value) in &auth {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn call<T: Payload>(
        &self,
        name: &str,
        version: ProtocolVersion,
    ) -> Result<Reply<T>, ExchangeError> {
        let url = self.endpoint(name, version)?;
        debug!(endpoint = name, %version, host = ?self.base.host_str(), "sending request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ExchangeError::transport(&err.without_url()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ExchangeError::transport(&err.without_url()))?;
        decode_reply(status.as_u16(), status.canonical_reason(), &bytes)
    }
}

#[async_trait]
impl SubsonicApi for HttpApi {
    async fn ping(&self, version: ProtocolVersion) -> Result<Reply<Pong>, ExchangeError> {
        self.call(PING_ENDPOINT, version).await
    }

    async fn license(&self, version: ProtocolVersion) -> Result<Reply<License>, ExchangeError> {
        self.call(LICENSE_ENDPOINT, version).await
    }
}
