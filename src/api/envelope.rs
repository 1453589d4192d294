//! Decoding of the JSON response envelope.
//!
//! Every response, successful or not, is wrapped in a `subsonic-response`
//! object carrying the status and the server's advertised version. Failed
//! responses still advertise a version, which is what makes the exploratory
//! probe useful even when the credentials are wrong.

use serde::Deserialize;
use tracing::debug;

use super::{
    License,
    Pong,
    Reply,
    errors::{ApiError, ApiErrorCode, ExchangeError, Rejection},
};
use crate::protocol::ProtocolVersion;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "subsonic-response")]
    response: ResponseBody,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ResponseStatus {
    Ok,
    Failed,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: u32,
    message: Option<String>,
}

/// Parsed `subsonic-response` element.
#[derive(Debug, Deserialize)]
pub struct ResponseBody {
    status: ResponseStatus,
    version: Option<String>,
    error: Option<ErrorBody>,
    license: Option<License>,
}

impl ResponseBody {
    fn server_version(&self) -> Option<ProtocolVersion> {
        let raw = self.version.as_deref()?;
        match raw.parse() {
            Ok(version) => Some(version),
            Err(err) => {
                debug!(version = raw, error = %err, "ignoring unparseable server version");
                None
            }
        }
    }
}

/// Payloads that can be extracted from a successful response.
pub trait Payload: Sized {
    /// Take the payload out of the response body.
    ///
    /// # Errors
    /// Returns [`ExchangeError::Malformed`] if the element is missing.
    fn extract(body: ResponseBody) -> Result<Self, ExchangeError>;
}

impl Payload for Pong {
    fn extract(_body: ResponseBody) -> Result<Self, ExchangeError> { Ok(Self) }
}

impl Payload for License {
    fn extract(body: ResponseBody) -> Result<Self, ExchangeError> {
        body.license
            .ok_or_else(|| ExchangeError::malformed("response has no license element"))
    }
}

/// Decode a response body into a [`Reply`].
///
/// `status` is the HTTP status code. A non-success status is reported as a
/// rejection even when the body happens to decode as a successful envelope.
///
/// # Errors
/// Returns [`ExchangeError::Rejected`] for failed envelopes and non-success
/// statuses, and [`ExchangeError::Malformed`] when a success status carries
/// an undecodable body.
pub fn decode_reply<T: Payload>(
    status: u16,
    reason: Option<&'static str>,
    bytes: &[u8],
) -> Result<Reply<T>, ExchangeError> {
    let success = (200..300).contains(&status);
    let body = match serde_json::from_slice::<Envelope>(bytes) {
        Ok(envelope) => envelope.response,
        Err(_) if !success => return Err(ExchangeError::http(status, reason)),
        Err(err) => return Err(ExchangeError::malformed(err)),
    };
    let server_version = body.server_version();
    if body.status == ResponseStatus::Failed {
        let error = body.error.map_or(
            ApiError {
                code: ApiErrorCode::Generic,
                message: None,
            },
            |ErrorBody { code, message }| ApiError {
                code: code.into(),
                message,
            },
        );
        return Err(ExchangeError::api(server_version, error));
    }
    if !success {
        return Err(ExchangeError::Rejected {
            server_version,
            reason: Rejection::Http { status, reason },
        });
    }
    let payload = T::extract(body)?;
    Ok(Reply {
        server_version,
        payload,
    })
}
