//! Error types for individual API exchanges.

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::protocol::ProtocolVersion;

/// Failure of a single request/response exchange.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// No usable response: connection, DNS, TLS or timeout failure.
    #[error("{detail}")]
    Transport {
        /// Displayable description of the cause.
        detail: String,
    },
    /// The server answered and refused the request.
    #[error("{reason}")]
    Rejected {
        /// Version advertised alongside the refusal, if any.
        server_version: Option<ProtocolVersion>,
        /// Why the request was refused.
        reason: Rejection,
    },
    /// The server answered with something that is not a usable response.
    #[error("invalid server response: {detail}")]
    Malformed {
        /// Displayable description of the decoding problem.
        detail: String,
    },
}

impl ExchangeError {
    /// Build a transport error, flattening the source chain into the detail.
    #[must_use]
    pub fn transport(err: &(dyn StdError + 'static)) -> Self {
        Self::Transport {
            detail: error_chain(err),
        }
    }

    /// Build a malformed-response error.
    #[must_use]
    pub fn malformed(detail: impl fmt::Display) -> Self {
        Self::Malformed {
            detail: detail.to_string(),
        }
    }

    /// Build a rejection carrying an application error.
    #[must_use]
    pub const fn api(server_version: Option<ProtocolVersion>, error: ApiError) -> Self {
        Self::Rejected {
            server_version,
            reason: Rejection::Api(error),
        }
    }

    /// Build a rejection from an HTTP status without a usable body.
    #[must_use]
    pub const fn http(status: u16, reason: Option<&'static str>) -> Self {
        Self::Rejected {
            server_version: None,
            reason: Rejection::Http { status, reason },
        }
    }
}

/// Reason a structurally valid response refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Non-success HTTP status.
    Http {
        /// Numeric status code.
        status: u16,
        /// Canonical reason phrase, when known.
        reason: Option<&'static str>,
    },
    /// `status == "failed"` in the response envelope.
    Api(ApiError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status,
                reason: Some(reason),
            } => write!(f, "HTTP {status} {reason}"),
            Self::Http {
                status,
                reason: None,
            } => write!(f, "HTTP {status}"),
            Self::Api(error) => fmt::Display::fmt(error, f),
        }
    }
}

/// Application-level error reported inside the response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Error code.
    pub code: ApiErrorCode,
    /// Server supplied message, if any.
    pub message: Option<String>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => {
                write!(f, "{message} (error {})", self.code.value())
            }
            _ => write!(
                f,
                "{} (error {})",
                self.code.description(),
                self.code.value()
            ),
        }
    }
}

/// Error codes defined by the REST dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// 0: generic error.
    Generic,
    /// 10: a required parameter is missing.
    MissingParameter,
    /// 20: client protocol version too old.
    ClientMustUpgrade,
    /// 30: server protocol version too old.
    ServerMustUpgrade,
    /// 40: wrong username or password.
    WrongCredentials,
    /// 41: token authentication not supported for LDAP users.
    TokenAuthNotSupported,
    /// 50: user not authorised for the operation.
    NotAuthorized,
    /// 60: trial period is over.
    TrialExpired,
    /// 70: requested data not found.
    NotFound,
    /// Any other code.
    Other(u32),
}

impl ApiErrorCode {
    /// Numeric wire value.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::Generic => 0,
            Self::MissingParameter => 10,
            Self::ClientMustUpgrade => 20,
            Self::ServerMustUpgrade => 30,
            Self::WrongCredentials => 40,
            Self::TokenAuthNotSupported => 41,
            Self::NotAuthorized => 50,
            Self::TrialExpired => 60,
            Self::NotFound => 70,
            Self::Other(code) => code,
        }
    }

    /// Default display text used when the server omits a message.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Generic | Self::Other(_) => "A generic error",
            Self::MissingParameter => "Required parameter is missing",
            Self::ClientMustUpgrade => {
                "Incompatible REST protocol version: client must upgrade"
            }
            Self::ServerMustUpgrade => {
                "Incompatible REST protocol version: server must upgrade"
            }
            Self::WrongCredentials => "Wrong username or password",
            Self::TokenAuthNotSupported => "Token authentication not supported for LDAP users",
            Self::NotAuthorized => "User is not authorized for the given operation",
            Self::TrialExpired => "The trial period for the server is over",
            Self::NotFound => "The requested data was not found",
        }
    }
}

impl From<u32> for ApiErrorCode {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Generic,
            10 => Self::MissingParameter,
            20 => Self::ClientMustUpgrade,
            30 => Self::ServerMustUpgrade,
            40 => Self::WrongCredentials,
            41 => Self::TokenAuthNotSupported,
            50 => Self::NotAuthorized,
            60 => Self::TrialExpired,
            70 => Self::NotFound,
            other => Self::Other(other),
        }
    }
}

/// Render an error and its sources as `outer: inner: root`.
#[must_use]
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}
