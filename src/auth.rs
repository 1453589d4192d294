//! Credential encoding policy derived from the negotiated version.
//!
//! Servers from 1.13.0 onwards accept a salted MD5 token in place of the
//! password. Older servers, and servers authenticating against LDAP, only
//! understand the hex-encoded password. The scheme is chosen per request
//! from the version presented on that request, which is what allows the
//! authoritative probe to succeed where the exploratory one was rejected.

use md5::{Digest, Md5};
use rand::RngCore;

use crate::protocol::ProtocolVersion;

const SALT_LEN: usize = 8;
const HEX_PASSWORD_PREFIX: &str = "enc:";

/// How credentials are presented to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `t`/`s` salted token.
    Token,
    /// `p=enc:<hex>` password.
    HexPassword,
}

impl AuthScheme {
    /// Select the scheme for a request presenting `version`.
    #[must_use]
    pub fn select(version: ProtocolVersion, ldap_support: bool) -> Self {
        if ldap_support || !version.supports_token_auth() {
            Self::HexPassword
        } else {
            Self::Token
        }
    }
}

/// Username and password for one profile.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
    ldap_support: bool,
}

impl Credentials {
    /// Capture credentials for later requests.
    #[must_use]
    pub const fn new(username: String, password: String, ldap_support: bool) -> Self {
        Self {
            username,
            password,
            ldap_support,
        }
    }

    /// Account name sent as `u`.
    #[must_use]
    pub fn username(&self) -> &str { &self.username }

    /// Build the authentication query parameters for a request.
    ///
    /// Token requests draw a fresh salt from `rng` on every call.
    #[must_use]
    pub fn query_pairs<R: RngCore>(
        &self,
        version: ProtocolVersion,
        rng: &mut R,
    ) -> Vec<(&'static str, String)> {
        match AuthScheme::select(version, self.ldap_support) {
            AuthScheme::Token => {
                let salt = salt(rng);
                vec![("t", token(&self.password, &salt)), ("s", salt)]
            }
            AuthScheme::HexPassword => vec![("p", hex_password(&self.password))],
        }
    }
}

/// Compute the token for `password` and `salt`.
#[must_use]
pub fn token(password: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Encode a password in the `enc:` hexadecimal form.
#[must_use]
pub fn hex_password(password: &str) -> String {
    format!("{HEX_PASSWORD_PREFIX}{}", hex::encode(password.as_bytes()))
}

fn salt<R: RngCore>(rng: &mut R) -> String {
    let mut bytes = [0u8; SALT_LEN];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
