//! Access token renewal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use gcal_mcp_core::AccountMode;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::credentials::ClientCredentials;
use crate::endpoint::TokenEndpoint;
use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::store::TokenStore;
use crate::tokens::TokenSet;

/// Keeps access tokens fresh, one refresh per mode at a time.
pub struct TokenRefresher {
    store: Arc<dyn TokenStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    margin: Duration,
    locks: Mutex<HashMap<AccountMode, Arc<AsyncMutex<()>>>>,
}

impl TokenRefresher {
    pub fn new(
        store: Arc<dyn TokenStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        margin: Duration,
    ) -> Self {
        Self {
            store,
            endpoint,
            margin,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    fn lock_for(&self, mode: AccountMode) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(mode).or_default())
    }

    /// Returns tokens valid for at least the refresh margin.
    ///
    /// Tokens already valid are returned as-is without I/O. Otherwise the
    /// mode's lock is taken and the store re-read, so callers that queued
    /// behind a refresh pick up its result instead of refreshing again.
    pub async fn ensure_valid(
        &self,
        mode: AccountMode,
        credentials: &ClientCredentials,
        tokens: TokenSet,
    ) -> AuthResult<TokenSet> {
        if tokens.is_valid_for(self.margin, Utc::now()) {
            return Ok(tokens);
        }

        let lock = self.lock_for(mode);
        let _guard = lock.lock().await;

        let mut current = match self.store.load(mode) {
            Ok(Some(stored)) if stored.is_valid_for(self.margin, Utc::now()) => {
                debug!(mode = %mode, "token already refreshed by another caller");
                return Ok(stored);
            }
            Ok(Some(stored)) => stored,
            Ok(None) => tokens,
            Err(e) if e.code() == AuthErrorCode::TokenStoreCorrupt => {
                warn!(mode = %mode, error = %e, "ignoring unreadable token store during refresh");
                tokens
            }
            Err(e) => return Err(e),
        };

        let Some(refresh_token) = current.refresh_token.clone() else {
            return Err(AuthError::reauthorization_required(format!(
                "no refresh token stored for the {mode} account"
            )));
        };

        info!(
            mode = %mode,
            expires_in_secs = current.time_until_expiry(Utc::now()).num_seconds(),
            "refreshing access token"
        );
        let response = self.endpoint.refresh(credentials, &refresh_token).await?;
        current.apply_refresh(response, Utc::now());
        self.store.save(mode, &current)?;
        Ok(current)
    }
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}
