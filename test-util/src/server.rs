//! Stub Subsonic server used by integration suites.
//!
//! Each [`StubServer`] binds an ephemeral loopback port and serves an
//! [`axum::Router`] on a background Tokio task until dropped. Responses follow
//! the JSON envelope real servers emit, including the advertised version on
//! refusals, so the client's negotiation logic sees realistic replies.
//! [`StubServer::start_tls`] serves the same router behind a freshly generated
//! self-signed certificate.

use std::{
    collections::HashMap,
    io,
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use axum::{
    Json,
    Router,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use md5::{Digest, Md5};
use rustls::{
    ServerConfig,
    pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
};
use serde_json::{Map, Value, json};
use sonar::protocol::{LICENSE_ENDPOINT, PING_ENDPOINT, ProtocolVersion, VersionError};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

const STALL: Duration = Duration::from_secs(60);
const DEFAULT_VERSION: ProtocolVersion = ProtocolVersion::new(1, 16, 1);

/// Reply the stub gives to `getLicense.view` once credentials check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseReply {
    /// `license.valid = true`.
    Valid,
    /// `license.valid = false`.
    Invalid,
    /// A successful envelope with no `license` element.
    Missing,
    /// A failed envelope carrying the given error code.
    Error(u32),
}

/// Misbehaviour injected for one request, addressed by arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer with this HTTP status and an HTML body.
    Status(u16),
    /// Answer `200 OK` with a body that is not JSON.
    Garbage,
    /// Hold the request long past any client timeout.
    Stall,
}

/// Behaviour of a [`StubServer`].
#[derive(Debug, Clone)]
pub struct StubConfig {
    version: Option<ProtocolVersion>,
    username: String,
    password: String,
    ldap: bool,
    license: LicenseReply,
    faults: HashMap<usize, Fault>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            version: Some(DEFAULT_VERSION),
            username: "alice".to_owned(),
            password: "sesame".to_owned(),
            ldap: false,
            license: LicenseReply::Valid,
            faults: HashMap::new(),
        }
    }
}

impl StubConfig {
    /// Advertise `version` in every envelope.
    #[must_use]
    pub const fn advertising(mut self, version: ProtocolVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Advertise the version spelled `raw`.
    ///
    /// # Errors
    ///
    /// Returns a [`VersionError`] when `raw` is not a dotted version.
    pub fn with_version(self, raw: &str) -> Result<Self, VersionError> {
        Ok(self.advertising(raw.parse()?))
    }

    /// Omit the version attribute from every envelope.
    #[must_use]
    pub const fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    /// Accept only this username and password.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Refuse token authentication with error 41, as LDAP-backed accounts do.
    #[must_use]
    pub const fn ldap_only(mut self) -> Self {
        self.ldap = true;
        self
    }

    /// Set the licence reply.
    #[must_use]
    pub const fn with_license(mut self, license: LicenseReply) -> Self {
        self.license = license;
        self
    }

    /// Inject `fault` into the request arriving at position `index`
    /// (zero-based).
    #[must_use]
    pub fn fail_request(mut self, index: usize, fault: Fault) -> Self {
        self.faults.insert(index, fault);
        self
    }

    /// JSON envelope the stub sends for `request` when no fault applies.
    #[must_use]
    pub fn respond(&self, request: &RecordedRequest) -> Value {
        if let Err(code) = self.authenticate(request) {
            return self.failure(code);
        }
        match (request.endpoint(), self.license) {
            (PING_ENDPOINT, _) | (LICENSE_ENDPOINT, LicenseReply::Missing) => self.envelope("ok", None),
            (LICENSE_ENDPOINT, LicenseReply::Valid | LicenseReply::Invalid) => {
                let license = json!({
                    "valid": self.license == LicenseReply::Valid,
                    "email": format!("{}@example.com", self.username),
                    "licenseExpires": "2030-01-01T00:00:00.000Z",
                });
                self.envelope("ok", Some(("license", license)))
            }
            (LICENSE_ENDPOINT, LicenseReply::Error(code)) => self.failure(code),
            _ => self.failure(70),
        }
    }

    fn authenticate(&self, request: &RecordedRequest) -> Result<(), u32> {
        let (Some(raw_client), Some(_)) = (request.param("v"), request.param("c")) else {
            return Err(10);
        };
        let client: ProtocolVersion = raw_client.parse().map_err(|_| 10_u32)?;
        if self.version.is_some_and(|server| client > server) {
            return Err(30);
        }
        let Some(user) = request.param("u") else {
            return Err(10);
        };
        let understands_tokens = self
            .version
            .is_none_or(ProtocolVersion::supports_token_auth);
        let password_ok = match (request.param("t").filter(|_| understands_tokens), request.param("p")) {
            (Some(_), _) if self.ldap => return Err(41),
            (Some(token), _) => {
                let salt = request.param("s").ok_or(10_u32)?;
                token == token_for(&self.password, salt)
            }
            (None, Some(encoded)) => decode_password(encoded).as_deref() == Some(self.password.as_str()),
            (None, None) => return Err(10),
        };
        if user == self.username && password_ok {
            Ok(())
        } else {
            Err(40)
        }
    }

    fn envelope(&self, status: &str, element: Option<(&str, Value)>) -> Value {
        let mut body = Map::new();
        body.insert("status".to_owned(), json!(status));
        if let Some(version) = self.version {
            body.insert("version".to_owned(), json!(version.to_string()));
        }
        if let Some((name, value)) = element {
            body.insert(name.to_owned(), value);
        }
        json!({ "subsonic-response": body })
    }

    fn failure(&self, code: u32) -> Value {
        let message = match code {
            10 => "Required parameter is missing.",
            30 => "Incompatible Subsonic REST protocol version. Server must upgrade.",
            40 => "Wrong username or password.",
            41 => "Token authentication not supported for LDAP users.",
            50 => "User is not authorized for the given operation.",
            60 => "The trial period for the Subsonic server is over.",
            70 => "The requested data was not found.",
            _ => "A generic error.",
        };
        self.envelope(
            "failed",
            Some(("error", json!({ "code": code, "message": message }))),
        )
    }
}

/// Salted MD5 token as a Subsonic server computes it.
#[must_use]
pub fn token_for(password: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

fn decode_password(encoded: &str) -> Option<String> {
    encoded.strip_prefix("enc:").map_or_else(
        || Some(encoded.to_owned()),
        |hex_text| {
            hex::decode(hex_text)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        },
    )
}

/// One request received by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    path: String,
    params: Vec<(String, String)>,
}

impl RecordedRequest {
    /// Request for `path` carrying `params` in query order.
    #[must_use]
    pub fn new(path: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }

    /// Full request path, e.g. `/music/rest/ping.view`.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Last path segment, e.g. `ping.view`.
    #[must_use]
    pub fn endpoint(&self) -> &str { self.path.rsplit('/').next().unwrap_or_default() }

    /// First value of query parameter `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Default)]
struct Shared {
    config: Mutex<StubConfig>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn record(&self, request: RecordedRequest) -> usize {
        let mut requests = lock(&self.requests);
        requests.push(request);
        requests.len() - 1
    }
}

/// Routes for the REST endpoints, at the root and under one base-path
/// segment such as `/music`.
fn router(shared: Arc<Shared>) -> Router {
    let rest = Router::new()
        .route(&format!("/rest/{PING_ENDPOINT}"), get(answer))
        .route(&format!("/rest/{LICENSE_ENDPOINT}"), get(answer));
    Router::new()
        .merge(rest.clone())
        .nest("/:base", rest)
        .fallback(answer)
        .with_state(shared)
}

async fn answer(
    State(shared): State<Arc<Shared>>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = RecordedRequest::new(uri.path(), params);
    let config = lock(&shared.config).clone();
    let index = shared.record(request.clone());
    match config.faults.get(&index) {
        Some(Fault::Stall) => {
            tokio::time::sleep(STALL).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        Some(&Fault::Status(status)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Html("<html><body>Service unavailable</body></html>"),
        )
            .into_response(),
        Some(Fault::Garbage) => Html("<html>not json</html>").into_response(),
        None => Json(config.respond(&request)).into_response(),
    }
}

/// Running stub server. The listener stops when the value is dropped.
#[derive(Debug)]
pub struct StubServer {
    addr: SocketAddr,
    scheme: &'static str,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Bind a loopback port and start answering plain HTTP requests.
    ///
    /// # Errors
    ///
    /// Returns any error raised while binding the listener.
    pub async fn start(config: StubConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            config: Mutex::new(config),
            requests: Mutex::default(),
        });
        let app = router(Arc::clone(&shared));
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                warn!(%err, "stub server stopped");
            }
        });
        debug!(%addr, "stub server listening");
        Ok(Self {
            addr,
            scheme: "http",
            shared,
            task,
        })
    }

    /// Bind a loopback port and answer HTTPS requests with a self-signed
    /// certificate for `localhost` and `127.0.0.1`.
    ///
    /// # Errors
    ///
    /// Returns any error raised while generating the certificate or binding
    /// the listener.
    pub async fn start_tls(config: StubConfig) -> io::Result<Self> {
        let acceptor = TlsAcceptor::from(self_signed_config()?);
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            config: Mutex::new(config),
            requests: Mutex::default(),
        });
        let task = tokio::spawn(serve_tls(listener, acceptor, router(Arc::clone(&shared))));
        debug!(%addr, "stub TLS server listening");
        Ok(Self {
            addr,
            scheme: "https",
            shared,
            task,
        })
    }

    /// Socket address the stub listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr { self.addr }

    /// Base URL for a profile pointing at the stub.
    #[must_use]
    pub fn base_url(&self) -> String { format!("{}://{}", self.scheme, self.addr) }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> { lock(&self.shared.requests).clone() }

    /// Change the stub's behaviour for subsequent requests.
    pub fn reconfigure(&self, update: impl FnOnce(&mut StubConfig)) {
        update(&mut lock(&self.shared.config));
    }
}

impl Drop for StubServer {
    fn drop(&mut self) { self.task.abort(); }
}

fn self_signed_config() -> io::Result<Arc<ServerConfig>> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_owned(), "127.0.0.1".to_owned()])
            .map_err(io::Error::other)?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(io::Error::other)?
        .with_no_client_auth()
        .with_single_cert(vec![cert.der().clone()], key)
        .map_err(io::Error::other)?;
    Ok(Arc::new(config))
}

async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, app: Router) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "stub server failed to accept");
                continue;
            }
        };
        let handshake = acceptor.accept(stream);
        let service = TowerToHyperService::new(app.clone());
        tokio::spawn(async move {
            let tls = match handshake.await {
                Ok(tls) => tls,
                Err(err) => {
                    debug!(%peer, %err, "stub TLS handshake failed");
                    return;
                }
            };
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(tls), service)
                .await
            {
                debug!(%peer, %err, "stub TLS connection ended with error");
            }
        });
    }
}

/// URL of a loopback port with nothing listening on it.
///
/// # Errors
///
/// Returns any error raised while reserving the port.
pub fn unused_local_url() -> io::Result<String> {
    let listener = StdTcpListener::bind(("127.0.0.1", 0))?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}
