//! Entry point tying credentials, storage, refresh and the browser flow
//! together.
//!
//! [`OAuthCoordinator::get_authorized_client`] is what request handlers
//! call: it returns a usable client from stored tokens when it can and
//! falls back to an interactive authorization when it must.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gcal_mcp_core::{AccountMode, EnvOverrides};
use tracing::{info, warn};

use crate::browser::{AuthorizationPrompt, PromptNotifier, open_in_browser, stderr_notifier};
use crate::callback::{CallbackServer, FlowRegistry};
use crate::config::AuthSettings;
use crate::credentials::{ClientCredentials, CredentialLoader};
use crate::endpoint::{GoogleTokenClient, TokenEndpoint};
use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::refresh::TokenRefresher;
use crate::store::{FileTokenStore, TokenStore};
use crate::tokens::TokenSet;

/// Orchestrates the token lifecycle for every account mode.
pub struct OAuthCoordinator {
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    refresher: TokenRefresher,
    loader: CredentialLoader,
    credentials_path: Option<PathBuf>,
    settings: AuthSettings,
    callback: CallbackServer,
    notifier: PromptNotifier,
    http_client: reqwest::Client,
}

impl OAuthCoordinator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        loader: CredentialLoader,
        settings: AuthSettings,
    ) -> Self {
        let refresher = TokenRefresher::new(
            Arc::clone(&store),
            Arc::clone(&endpoint),
            settings.refresh_margin_chrono(),
        );
        Self {
            store,
            endpoint,
            refresher,
            loader,
            credentials_path: None,
            callback: CallbackServer::new(settings.clone()),
            settings,
            notifier: stderr_notifier(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Wires up the file store, Google's token endpoint and the credential
    /// chain from environment overrides.
    pub fn from_env(env: &EnvOverrides, settings: AuthSettings) -> AuthResult<Self> {
        let client = GoogleTokenClient::new(settings.http_timeout)?
            .with_token_url(settings.token_url.clone());
        let http_client = client.http_client().clone();
        let store = FileTokenStore::from_env(env);
        info!(path = %store.path().display(), "using token store");

        Ok(Self::new(
            Arc::new(store),
            Arc::new(client),
            CredentialLoader::from_env(env),
            settings,
        )
        .with_http_client(http_client))
    }

    /// Credentials file passed explicitly, ahead of every other source.
    pub fn with_credentials_path(mut self, path: Option<PathBuf>) -> Self {
        self.credentials_path = path;
        self
    }

    /// Receives the consent URL whenever a flow starts listening.
    pub fn with_notifier(mut self, notifier: PromptNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Tracks running flows in `flows` instead of the process-wide registry.
    pub fn with_flow_registry(mut self, flows: FlowRegistry) -> Self {
        self.callback = self.callback.with_registry(flows);
        self
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Loads the client credentials through the resolver chain.
    pub fn credentials(&self) -> AuthResult<ClientCredentials> {
        self.loader.load(self.credentials_path.as_deref())
    }

    /// Returns a client holding a valid access token for `mode`.
    ///
    /// Stored tokens are refreshed when close to expiry. Missing, unreadable
    /// or unrenewable tokens start the interactive flow. Failures of that
    /// flow come back as `AuthorizationFailed` with the cause attached,
    /// except `AuthorizationAlreadyInProgress`, which is returned as is.
    pub async fn get_authorized_client(&self, mode: AccountMode) -> AuthResult<AuthorizedClient> {
        let credentials = self.credentials()?;

        match self.stored_tokens(mode)? {
            Some(tokens) if !tokens.has_scopes(&self.settings.scopes) => {
                info!(mode = %mode, "stored tokens lack required scopes, re-authorizing");
            }
            Some(tokens) => match self.refresher.ensure_valid(mode, &credentials, tokens).await {
                Ok(tokens) => return Ok(self.client_for(mode, tokens)),
                Err(e) if e.code() == AuthErrorCode::ReauthorizationRequired => {
                    info!(mode = %mode, reason = %e, "re-authorization required");
                }
                Err(e) => return Err(e),
            },
            None => info!(mode = %mode, "no stored tokens, starting authorization"),
        }

        self.run_flow(mode, &credentials, true).await
    }

    /// Runs the interactive flow even if usable tokens are stored.
    pub async fn authorize_interactive(&self, mode: AccountMode) -> AuthResult<AuthorizedClient> {
        let credentials = self.credentials()?;
        self.run_flow(mode, &credentials, false).await
    }

    /// Describes the stored tokens for `mode` without touching the network.
    pub fn status(&self, mode: AccountMode) -> AuthResult<AuthStatus> {
        let now = Utc::now();
        let tokens = match self.store.load(mode) {
            Ok(tokens) => tokens,
            Err(e) if e.code() == AuthErrorCode::TokenStoreCorrupt => {
                return Ok(AuthStatus {
                    mode,
                    state: TokenState::Unreadable,
                    expires_at: None,
                    has_refresh_token: false,
                    missing_scopes: Vec::new(),
                });
            }
            Err(e) => return Err(e),
        };

        let Some(tokens) = tokens else {
            return Ok(AuthStatus {
                mode,
                state: TokenState::Missing,
                expires_at: None,
                has_refresh_token: false,
                missing_scopes: Vec::new(),
            });
        };

        let state = if tokens.is_expired(now) {
            TokenState::Expired
        } else if tokens.is_valid_for(self.refresher.margin(), now) {
            TokenState::Valid
        } else {
            TokenState::ExpiringSoon
        };

        Ok(AuthStatus {
            mode,
            state,
            expires_at: Some(tokens.expiry_date),
            has_refresh_token: tokens.refresh_token.is_some(),
            missing_scopes: self
                .settings
                .scopes
                .iter()
                .filter(|s| !tokens.scope.contains(*s))
                .cloned()
                .collect(),
        })
    }

    /// Forgets the tokens of `mode`; other modes are kept.
    pub fn sign_out(&self, mode: AccountMode) -> AuthResult<()> {
        self.store.delete(mode)?;
        info!(mode = %mode, "signed out");
        Ok(())
    }

    fn stored_tokens(&self, mode: AccountMode) -> AuthResult<Option<TokenSet>> {
        match self.store.load(mode) {
            Err(e) if e.code() == AuthErrorCode::TokenStoreCorrupt => {
                warn!(mode = %mode, error = %e, "token store unreadable, treating as empty");
                Ok(None)
            }
            other => other,
        }
    }

    async fn run_flow(
        &self,
        mode: AccountMode,
        credentials: &ClientCredentials,
        reuse_fresh: bool,
    ) -> AuthResult<AuthorizedClient> {
        let tokens = self
            .interactive(mode, credentials, reuse_fresh)
            .await
            .map_err(|e| match e.code() {
                AuthErrorCode::AuthorizationAlreadyInProgress => e,
                _ => AuthError::authorization_failed(e),
            })?;
        Ok(self.client_for(mode, tokens))
    }

    async fn interactive(
        &self,
        mode: AccountMode,
        credentials: &ClientCredentials,
        reuse_fresh: bool,
    ) -> AuthResult<TokenSet> {
        let listening = self.callback.listen(mode).await?;

        // A flow that finished between our store read and taking the slot
        // has already produced what we need.
        if reuse_fresh
            && let Ok(Some(tokens)) = self.store.load(mode)
            && tokens.is_valid_for(self.refresher.margin(), Utc::now())
            && tokens.has_scopes(&self.settings.scopes)
        {
            info!(mode = %mode, "tokens appeared while waiting, skipping authorization");
            return Ok(tokens);
        }

        let prompt = AuthorizationPrompt {
            mode,
            url: listening.authorization_url(&credentials.client_id),
            port: listening.port(),
        };
        (self.notifier)(&prompt);
        if self.settings.open_browser {
            open_in_browser(&prompt.url);
        }

        listening
            .complete(|received| async move {
                let response = self
                    .endpoint
                    .exchange_code(
                        credentials,
                        &received.code,
                        &received.code_verifier,
                        &received.redirect_uri,
                    )
                    .await?;
                let tokens = TokenSet::from_response(response, &self.settings.scopes, Utc::now());
                if tokens.refresh_token.is_none() {
                    warn!(mode = %mode, "provider issued no refresh token");
                }
                self.store.save(mode, &tokens)?;
                Ok(tokens)
            })
            .await
    }

    fn client_for(&self, mode: AccountMode, tokens: TokenSet) -> AuthorizedClient {
        AuthorizedClient {
            mode,
            tokens,
            http_client: self.http_client.clone(),
        }
    }
}

impl fmt::Debug for OAuthCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCoordinator")
            .field("loader", &self.loader)
            .field("credentials_path", &self.credentials_path)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// A handle for calling Google APIs as one account mode.
#[derive(Clone)]
pub struct AuthorizedClient {
    mode: AccountMode,
    tokens: TokenSet,
    http_client: reqwest::Client,
}

impl AuthorizedClient {
    pub fn mode(&self) -> AccountMode {
        self.mode
    }

    pub fn access_token(&self) -> &str {
        &self.tokens.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.tokens.expiry_date
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.tokens.scope
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Adds the bearer token to a request.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.tokens.access_token)
    }

    /// Starts an authorized GET request.
    pub fn get(&self, url: impl reqwest::IntoUrl) -> reqwest::RequestBuilder {
        self.authorize(self.http_client.get(url))
    }
}

impl fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("mode", &self.mode)
            .field("expires_at", &self.tokens.expiry_date)
            .field("scopes", &self.tokens.scope)
            .finish_non_exhaustive()
    }
}

/// Condition of the stored access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Missing,
    Unreadable,
    Valid,
    ExpiringSoon,
    Expired,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "not authorized",
            Self::Unreadable => "token file unreadable",
            Self::Valid => "valid",
            Self::ExpiringSoon => "expiring soon",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offline view of one mode's authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub mode: AccountMode,
    pub state: TokenState,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
    /// Configured scopes the stored grant does not cover.
    pub missing_scopes: Vec<String>,
}

impl AuthStatus {
    /// Returns true if the next API call would need the user.
    pub fn needs_authorization(&self) -> bool {
        match self.state {
            TokenState::Missing | TokenState::Unreadable => true,
            TokenState::Valid => !self.missing_scopes.is_empty(),
            TokenState::ExpiringSoon | TokenState::Expired => {
                !self.has_refresh_token || !self.missing_scopes.is_empty()
            }
        }
    }
}
