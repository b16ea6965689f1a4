//! Error types for credential loading, token storage and authorization.

use std::fmt;
use thiserror::Error;

/// The category of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// No credentials source resolved to a file.
    CredentialsNotFound,
    /// A credentials file exists but has no usable client identity.
    CredentialsMalformed,
    /// Every port in the loopback range is taken.
    NoPortAvailable,
    /// No callback arrived before the listener deadline.
    AuthorizationTimedOut,
    /// The callback carried a state value other than the one issued.
    StateMismatch,
    /// Another interactive flow is already running in this process.
    AuthorizationAlreadyInProgress,
    /// The user or provider refused consent.
    AuthorizationDenied,
    /// The interactive flow failed; the cause is attached as the source.
    AuthorizationFailed,
    /// The token file exists but cannot be parsed.
    TokenStoreCorrupt,
    /// Stored tokens cannot be renewed without the user.
    ReauthorizationRequired,
    /// Connection failure or timeout talking to the provider.
    NetworkError,
    /// The provider answered with an error payload.
    ProviderError,
    /// Filesystem failure while persisting tokens.
    StorageError,
    /// Unexpected internal state.
    InternalError,
}

impl AuthErrorCode {
    /// Returns true if trying again later, without user action, may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::NoPortAvailable)
    }

    /// Returns true if the caller should start a new interactive flow.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::ReauthorizationRequired | Self::TokenStoreCorrupt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialsNotFound => "credentials_not_found",
            Self::CredentialsMalformed => "credentials_malformed",
            Self::NoPortAvailable => "no_port_available",
            Self::AuthorizationTimedOut => "authorization_timed_out",
            Self::StateMismatch => "state_mismatch",
            Self::AuthorizationAlreadyInProgress => "authorization_already_in_progress",
            Self::AuthorizationDenied => "authorization_denied",
            Self::AuthorizationFailed => "authorization_failed",
            Self::TokenStoreCorrupt => "token_store_corrupt",
            Self::ReauthorizationRequired => "reauthorization_required",
            Self::NetworkError => "network_error",
            Self::ProviderError => "provider_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by the OAuth core.
#[derive(Debug, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    /// HTTP status of a provider error response, when there was one.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn credentials_not_found(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::CredentialsNotFound, message)
    }

    pub fn credentials_malformed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::CredentialsMalformed, message)
    }

    pub fn no_port_available(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::NoPortAvailable, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthorizationTimedOut, message)
    }

    pub fn state_mismatch() -> Self {
        Self::new(
            AuthErrorCode::StateMismatch,
            "OAuth state mismatch - possible CSRF attempt",
        )
    }

    pub fn already_in_progress() -> Self {
        Self::new(
            AuthErrorCode::AuthorizationAlreadyInProgress,
            "an authorization flow is already waiting for the browser",
        )
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthorizationDenied, message)
    }

    /// Wraps an interactive-flow failure, keeping it as the source.
    pub fn authorization_failed(cause: AuthError) -> Self {
        Self::new(
            AuthErrorCode::AuthorizationFailed,
            format!("authorization failed: {}", cause.message),
        )
        .with_source(cause)
    }

    pub fn store_corrupt(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::TokenStoreCorrupt, message)
    }

    pub fn reauthorization_required(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::ReauthorizationRequired, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::NetworkError, message)
    }

    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(AuthErrorCode::ProviderError, message);
        err.status = Some(status);
        err
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::StorageError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InternalError, message)
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the provider response, if this came from one.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Code of the innermost [`AuthError`] in the source chain.
    ///
    /// For an `AuthorizationFailed` wrapper this is the code of the
    /// failure that ended the flow.
    pub fn root_code(&self) -> AuthErrorCode {
        let mut current = self;
        while let Some(inner) = current
            .source
            .as_deref()
            .and_then(|s| s.downcast_ref::<AuthError>())
        {
            current = inner;
        }
        current.code
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
            || (self.code == AuthErrorCode::ProviderError
                && self.status.is_some_and(|s| s >= 500))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
