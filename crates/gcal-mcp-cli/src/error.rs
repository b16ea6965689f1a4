//! CLI error types.

use gcal_mcp_auth::{AuthError, AuthErrorCode};
use gcal_mcp_core::{ModeParseError, TracingError};
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Mode(#[from] ModeParseError),

    #[error("cannot set up logging: {0}")]
    Tracing(#[from] TracingError),
}

impl CliError {
    /// One-line advice for the user, when there is something to do.
    pub fn hint(&self) -> Option<&'static str> {
        let Self::Auth(err) = self else {
            return None;
        };
        match err.root_code() {
            AuthErrorCode::CredentialsNotFound => Some(
                "download the OAuth client JSON from the Google Cloud Console and pass it with \
                 --credentials-file or GOOGLE_OAUTH_CREDENTIALS",
            ),
            AuthErrorCode::NoPortAvailable => {
                Some("free one of the callback ports or set port_start/port_end in config.toml")
            }
            AuthErrorCode::AuthorizationAlreadyInProgress => {
                Some("finish the authorization already open in your browser")
            }
            AuthErrorCode::ReauthorizationRequired | AuthErrorCode::TokenStoreCorrupt => {
                Some("run `gcal-mcp auth --force`")
            }
            AuthErrorCode::AuthorizationTimedOut => Some("run `gcal-mcp auth` again"),
            _ => None,
        }
    }
}
