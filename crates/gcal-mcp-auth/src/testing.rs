//! Scripted token endpoint for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::credentials::ClientCredentials;
use crate::endpoint::{BoxFuture, TokenEndpoint};
use crate::error::{AuthError, AuthResult};
use crate::tokens::TokenResponse;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Tokens(TokenResponse),
    InvalidGrant,
    ServerError,
}

impl Reply {
    pub(crate) fn tokens(access: &str, refresh: Option<&str>) -> Self {
        Self::Tokens(TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3600),
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }

    fn to_result(&self) -> AuthResult<TokenResponse> {
        match self {
            Self::Tokens(response) => Ok(response.clone()),
            Self::InvalidGrant => Err(AuthError::reauthorization_required(
                "token refresh rejected: invalid_grant",
            )),
            Self::ServerError => Err(AuthError::provider(503, "backend unavailable")),
        }
    }
}

/// Counts calls and answers from a script.
#[derive(Debug)]
pub(crate) struct FakeEndpoint {
    refresh: Reply,
    exchange: Reply,
    delay: Duration,
    refresh_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
    last_code: Mutex<Option<String>>,
}

impl FakeEndpoint {
    pub(crate) fn new() -> Self {
        Self {
            refresh: Reply::tokens("refreshed-access", None),
            exchange: Reply::tokens("exchanged-access", Some("exchanged-refresh")),
            delay: Duration::ZERO,
            refresh_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            last_code: Mutex::new(None),
        }
    }

    pub(crate) fn with_refresh(mut self, reply: Reply) -> Self {
        self.refresh = reply;
        self
    }

    pub(crate) fn with_exchange(mut self, reply: Reply) -> Self {
        self.exchange = reply;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_code(&self) -> Option<String> {
        self.last_code.lock().unwrap().clone()
    }
}

impl TokenEndpoint for FakeEndpoint {
    fn exchange_code<'a>(
        &'a self,
        _credentials: &'a ClientCredentials,
        code: &'a str,
        _code_verifier: &'a str,
        _redirect_uri: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_code.lock().unwrap() = Some(code.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.exchange.to_result()
        })
    }

    fn refresh<'a>(
        &'a self,
        _credentials: &'a ClientCredentials,
        _refresh_token: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.refresh.to_result()
        })
    }
}
