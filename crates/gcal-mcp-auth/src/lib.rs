//! OAuth 2.0 credential and token lifecycle for the Google Calendar MCP
//! server.
//!
//! - [`CredentialLoader`] finds and parses the client credentials file
//! - [`TokenStore`] persists one [`TokenSet`] per [`AccountMode`]
//! - [`TokenRefresher`] renews access tokens shortly before they expire
//! - [`CallbackServer`] receives the browser redirect on a loopback port
//! - [`OAuthCoordinator`] ties them together behind
//!   [`OAuthCoordinator::get_authorized_client`]
//!
//! # Example
//!
//! ```ignore
//! use gcal_mcp_auth::{AuthSettings, OAuthCoordinator};
//! use gcal_mcp_core::{AccountMode, EnvOverrides};
//!
//! let env = EnvOverrides::from_env();
//! let coordinator = OAuthCoordinator::from_env(&env, AuthSettings::default())?;
//! let client = coordinator.get_authorized_client(AccountMode::Normal).await?;
//! let calendars = client
//!     .get("https://www.googleapis.com/calendar/v3/users/me/calendarList")
//!     .send()
//!     .await?;
//! ```

pub mod browser;
pub mod callback;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod pkce;
pub mod refresh;
pub mod store;
pub mod tokens;

#[cfg(test)]
mod testing;

pub use browser::{AuthorizationPrompt, PromptNotifier, open_in_browser, stderr_notifier};
pub use callback::{
    CallbackServer, FlowRegistry, FlowState, ListeningServer, PendingAuthorization,
    ReceivedCode, bind_first_available,
};
pub use config::AuthSettings;
pub use coordinator::{AuthStatus, AuthorizedClient, OAuthCoordinator, TokenState};
pub use credentials::{ClientCredentials, CredentialLoader, Resolution, Resolver};
pub use endpoint::{BoxFuture, GoogleTokenClient, TokenEndpoint};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use gcal_mcp_core::AccountMode;
pub use pkce::PkceFlow;
pub use refresh::TokenRefresher;
pub use store::{FileTokenStore, TokenMap, TokenStore};
pub use tokens::{TokenResponse, TokenSet};
