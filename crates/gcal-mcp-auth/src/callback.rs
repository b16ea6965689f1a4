//! Loopback HTTP listener that receives the OAuth redirect.
//!
//! [`CallbackServer::listen`] binds the first free port in the configured
//! range and hands back a [`ListeningServer`]. Driving it with
//! [`ListeningServer::complete`] walks the flow through
//! `Listening -> CodeReceived -> Exchanging -> Completed`, or to `Failed`
//! on timeout, state mismatch, denial or exchange error. The listener and
//! the mode's flow slot live inside the `ListeningServer`, so every exit
//! path releases both.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use gcal_mcp_core::AccountMode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, error::Elapsed, timeout, timeout_at};
use tracing::{debug, info, warn};

use crate::config::AuthSettings;
use crate::error::{AuthError, AuthResult};
use crate::pkce::PkceFlow;

/// Upper bound on the request head we are willing to buffer.
const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// Path answering health checks while a flow is waiting.
pub const HEALTH_PATH: &str = "/health";

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>Authorization Successful</title></head>\
<body><h1>Authorization Successful</h1>\
<p>Google Calendar access was granted. You can close this window.</p></body></html>";

/// Phase of an interactive authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Listening,
    CodeReceived,
    Exchanging,
    Completed,
    Failed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::CodeReceived => "code_received",
            Self::Exchanging => "exchanging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secrets and addressing of one in-flight authorization.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pkce: PkceFlow,
    redirect_uri: String,
    bound_port: u16,
    started_at: DateTime<Utc>,
}

impl PendingAuthorization {
    fn new(bound_port: u16, callback_path: &str) -> Self {
        Self {
            pkce: PkceFlow::new(),
            redirect_uri: format!("http://127.0.0.1:{bound_port}{callback_path}"),
            bound_port,
            started_at: Utc::now(),
        }
    }

    /// The CSRF state value issued in the authorization URL.
    pub fn state(&self) -> &str {
        &self.pkce.state
    }

    pub fn code_verifier(&self) -> &str {
        &self.pkce.verifier
    }

    pub fn code_challenge(&self) -> &str {
        &self.pkce.challenge
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn bound_port(&self) -> u16 {
        self.bound_port
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// What the exchange step receives once a valid callback arrives.
pub struct ReceivedCode {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

impl fmt::Debug for ReceivedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedCode")
            .field("code", &"[redacted]")
            .field("code_verifier", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

static PROCESS_FLOWS: LazyLock<FlowRegistry> = LazyLock::new(FlowRegistry::default);

/// Account modes with an interactive flow in progress.
///
/// At most one flow per mode; flows for different modes run side by side.
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    active: Arc<Mutex<BTreeSet<AccountMode>>>,
}

impl FlowRegistry {
    /// The registry every [`CallbackServer::new`] in this process shares.
    pub fn process() -> Self {
        PROCESS_FLOWS.clone()
    }

    pub fn is_active(&self, mode: AccountMode) -> bool {
        self.lock().contains(&mode)
    }

    fn try_start(&self, mode: AccountMode) -> Option<FlowSlot> {
        self.lock().insert(mode).then(|| FlowSlot {
            registry: self.clone(),
            mode,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<AccountMode>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks `mode` as authorizing until dropped.
#[derive(Debug)]
struct FlowSlot {
    registry: FlowRegistry,
    mode: AccountMode,
}

impl Drop for FlowSlot {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.mode);
    }
}

/// Starts loopback listeners, one flow per account mode at a time.
#[derive(Debug, Clone)]
pub struct CallbackServer {
    settings: AuthSettings,
    flows: FlowRegistry,
}

impl CallbackServer {
    /// Server sharing the process-wide [`FlowRegistry`].
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            settings,
            flows: FlowRegistry::process(),
        }
    }

    /// Tracks flows in `flows` instead of the process-wide registry.
    pub fn with_registry(mut self, flows: FlowRegistry) -> Self {
        self.flows = flows;
        self
    }

    /// Returns true while a flow for `mode` is listening.
    pub fn is_busy(&self, mode: AccountMode) -> bool {
        self.flows.is_active(mode)
    }

    /// Takes the flow slot for `mode`, binds a port and issues fresh flow
    /// secrets.
    ///
    /// Fails fast with `AuthorizationAlreadyInProgress` when a flow for the
    /// same mode is running, and with `NoPortAvailable` when the whole range
    /// is taken.
    pub async fn listen(&self, mode: AccountMode) -> AuthResult<ListeningServer> {
        let slot = self
            .flows
            .try_start(mode)
            .ok_or_else(AuthError::already_in_progress)?;
        let (listener, port) = bind_first_available(self.settings.ports()).await?;
        let pending = PendingAuthorization::new(port, &self.settings.callback_path);

        info!(
            mode = %mode,
            port,
            redirect_uri = %pending.redirect_uri,
            "waiting for OAuth callback"
        );

        Ok(ListeningServer {
            listener,
            pending,
            settings: self.settings.clone(),
            state: FlowState::Listening,
            slot,
        })
    }
}

/// Binds 127.0.0.1 on the first free port of `ports`, in order.
pub async fn bind_first_available(ports: RangeInclusive<u16>) -> AuthResult<(TcpListener, u16)> {
    let (start, end) = (*ports.start(), *ports.end());
    for port in ports {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => {
                debug!(port, "bound callback listener");
                return Ok((listener, port));
            }
            Err(e) => debug!(port, error = %e, "port unavailable"),
        }
    }
    Err(AuthError::no_port_available(format!(
        "no available port in range {start}-{end}"
    )))
}

/// A bound listener waiting for the provider's redirect.
#[derive(Debug)]
pub struct ListeningServer {
    listener: TcpListener,
    pending: PendingAuthorization,
    settings: AuthSettings,
    state: FlowState,
    slot: FlowSlot,
}

/// A connection whose request head has been read, or not in time.
type RequestRead = (TcpStream, SocketAddr, Result<io::Result<String>, Elapsed>);

enum Next {
    Accepted(Result<io::Result<(TcpStream, SocketAddr)>, Elapsed>),
    Read(Result<RequestRead, JoinError>),
}

impl ListeningServer {
    pub fn mode(&self) -> AccountMode {
        self.slot.mode
    }

    pub fn port(&self) -> u16 {
        self.pending.bound_port
    }

    pub fn redirect_uri(&self) -> &str {
        &self.pending.redirect_uri
    }

    pub fn pending(&self) -> &PendingAuthorization {
        &self.pending
    }

    pub fn flow_state(&self) -> FlowState {
        self.state
    }

    /// Consent URL the user has to visit for this flow.
    pub fn authorization_url(&self, client_id: &str) -> String {
        self.pending.pkce.build_auth_url(
            &self.settings.auth_url,
            client_id,
            &self.pending.redirect_uri,
            &self.settings.scopes,
        )
    }

    /// Serves requests until the callback arrives or the deadline passes.
    ///
    /// `exchange` runs only for a callback whose state matches; its result
    /// is returned unchanged and decides which page the browser gets.
    pub async fn complete<T, F, Fut>(mut self, exchange: F) -> AuthResult<T>
    where
        F: FnOnce(ReceivedCode) -> Fut,
        Fut: Future<Output = AuthResult<T>>,
    {
        let deadline = Instant::now() + self.settings.callback_timeout;
        let read_timeout = self.settings.request_read_timeout;
        // Request heads are read concurrently so an idle connection, such as
        // a browser preconnect, cannot hold up the real callback.
        let mut reads: JoinSet<RequestRead> = JoinSet::new();

        loop {
            let next = tokio::select! {
                accepted = timeout_at(deadline, self.listener.accept()) => Next::Accepted(accepted),
                Some(read) = reads.join_next() => Next::Read(read),
            };

            let (mut stream, peer, target) = match next {
                Next::Accepted(Ok(Ok((mut stream, peer)))) => {
                    reads.spawn(async move {
                        let target = timeout(read_timeout, read_request_target(&mut stream)).await;
                        (stream, peer, target)
                    });
                    continue;
                }
                Next::Accepted(Ok(Err(e))) => {
                    warn!(error = %e, "failed to accept callback connection");
                    continue;
                }
                Next::Accepted(Err(_)) => {
                    self.transition(FlowState::Failed);
                    return Err(AuthError::timed_out(format!(
                        "no OAuth callback received within {}s",
                        self.settings.callback_timeout.as_secs()
                    )));
                }
                Next::Read(Ok(read)) => read,
                Next::Read(Err(e)) => {
                    warn!(error = %e, "callback request reader failed");
                    continue;
                }
            };

            let target = match target {
                Ok(Ok(target)) => target,
                Ok(Err(e)) => {
                    debug!(%peer, error = %e, "discarding malformed request");
                    respond(&mut stream, "400 Bad Request", "text/plain", "bad request").await;
                    continue;
                }
                Err(_) => {
                    debug!(%peer, "timed out reading request");
                    continue;
                }
            };

            let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
            if path == HEALTH_PATH {
                respond(&mut stream, "200 OK", "text/plain", "ok").await;
                continue;
            }
            if path != self.settings.callback_path {
                debug!(%peer, path, "ignoring request for unknown path");
                respond(&mut stream, "404 Not Found", "text/plain", "not found").await;
                continue;
            }

            let code = match self.check_callback(CallbackParams::parse(query), peer) {
                Ok(code) => code,
                Err(err) => {
                    self.transition(FlowState::Failed);
                    respond(&mut stream, "400 Bad Request", "text/html", &error_page(&err)).await;
                    return Err(err);
                }
            };

            self.transition(FlowState::CodeReceived);
            let received = ReceivedCode {
                code,
                code_verifier: self.pending.code_verifier().to_string(),
                redirect_uri: self.pending.redirect_uri.clone(),
            };
            self.transition(FlowState::Exchanging);

            return match exchange(received).await {
                Ok(value) => {
                    self.transition(FlowState::Completed);
                    respond(&mut stream, "200 OK", "text/html", SUCCESS_PAGE).await;
                    info!(mode = %self.mode(), port = self.port(), "authorization completed");
                    Ok(value)
                }
                Err(err) => {
                    self.transition(FlowState::Failed);
                    let page = error_page(&err);
                    respond(&mut stream, "500 Internal Server Error", "text/html", &page).await;
                    Err(err)
                }
            };
        }
    }

    /// Validates the redirect parameters, returning the authorization code.
    fn check_callback(&self, params: CallbackParams, peer: SocketAddr) -> AuthResult<String> {
        if params.state.as_deref() != Some(self.pending.state()) {
            warn!(%peer, "OAuth callback state mismatch");
            return Err(AuthError::state_mismatch());
        }
        if let Some(error) = params.error {
            let detail = params
                .error_description
                .map(|d| format!(" ({d})"))
                .unwrap_or_default();
            return Err(AuthError::denied(format!("authorization denied: {error}{detail}")));
        }
        params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AuthError::denied("callback did not include an authorization code"))
    }

    fn transition(&mut self, next: FlowState) {
        debug!(from = %self.state, to = %next, "authorization flow state");
        self.state = next;
    }
}

#[derive(Debug, Default)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

/// Reads the request head and returns the target of a GET request line.
async fn read_request_target(stream: &mut TcpStream) -> io::Result<String> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() >= MAX_REQUEST_HEAD {
            break;
        }
    }

    let head = String::from_utf8_lossy(&head);
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        (Some(method), Some(_)) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported method {method}"),
        )),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "malformed request line",
        )),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}; charset=utf-8\r\n\
        Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "failed to write callback response");
    }
    let _ = stream.shutdown().await;
}

fn error_page(err: &AuthError) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Authorization Failed</title></head>\
        <body><h1>Authorization Failed</h1><p>Reason: {}</p>\
        <p>You can close this window and try again.</p></body></html>",
        err.code()
    )
}
