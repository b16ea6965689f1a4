//! OAuth client credentials and where to find them.
//!
//! Google Cloud Console exports the client identity in different shapes
//! depending on the application type chosen when the client was created:
//!
//! 1. `{"installed": {...}}` for desktop clients
//! 2. `{"web": {...}}` for web clients
//! 3. a flat object with `client_id`/`client_secret` at the root (gcloud and
//!    hand-written files)
//!
//! All three normalize into [`ClientCredentials`].

use std::fmt;
use std::path::{Path, PathBuf};

use gcal_mcp_core::EnvOverrides;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Redirect URI assumed when a credentials file lists none. Desktop clients
/// accept any loopback port under this base.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1";

/// Client identity registered with the authorization provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uris", &self.redirect_uris)
            .finish()
    }
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uris: vec![DEFAULT_REDIRECT_URI.to_string()],
        }
    }

    pub fn with_redirect_uris(mut self, uris: Vec<String>) -> Self {
        self.redirect_uris = uris;
        self
    }

    /// Parses any of the three supported JSON shapes.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            AuthError::credentials_malformed(format!("failed to parse credentials JSON: {e}"))
                .with_source(e)
        })?;

        let raw = file.into_client().ok_or_else(|| {
            AuthError::credentials_malformed(
                "credentials file must contain an 'installed' or 'web' section, \
                 or 'client_id'/'client_secret' at root level",
            )
        })?;

        let credentials = Self {
            client_id: raw.client_id.unwrap_or_default(),
            client_secret: raw.client_secret.unwrap_or_default(),
            redirect_uris: match raw.redirect_uris {
                Some(uris) if !uris.is_empty() => uris,
                _ => vec![DEFAULT_REDIRECT_URI.to_string()],
            },
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Checks that the identity is usable.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::credentials_malformed("client_id is required"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::credentials_malformed("client_secret is required"));
        }
        if self.redirect_uris.is_empty() {
            return Err(AuthError::credentials_malformed(
                "at least one redirect URI is required",
            ));
        }
        Ok(())
    }
}

/// Union of the three credential file shapes.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<RawClient>,
    web: Option<RawClient>,
    #[serde(flatten)]
    flat: RawClient,
}

#[derive(Debug, Default, Deserialize)]
struct RawClient {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uris: Option<Vec<String>>,
}

impl CredentialsFile {
    fn into_client(self) -> Option<RawClient> {
        if let Some(installed) = self.installed {
            return Some(installed);
        }
        if let Some(web) = self.web {
            return Some(web);
        }
        if self.flat.client_id.is_some() || self.flat.client_secret.is_some() {
            return Some(self.flat);
        }
        None
    }
}

/// One step of the credentials lookup chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolver {
    /// Path passed by the caller.
    ExplicitPath,
    /// Path held by `GOOGLE_OAUTH_CREDENTIALS`.
    Environment,
    /// `<config dir>/gcp-oauth.keys.json`.
    DefaultLocation,
}

impl Resolver {
    /// Lookup order; the first resolver that finds a file wins.
    pub const ORDER: [Resolver; 3] = [
        Resolver::ExplicitPath,
        Resolver::Environment,
        Resolver::DefaultLocation,
    ];

    fn describe(&self) -> &'static str {
        match self {
            Self::ExplicitPath => "explicit path",
            Self::Environment => "GOOGLE_OAUTH_CREDENTIALS",
            Self::DefaultLocation => "default location",
        }
    }
}

/// Outcome of a single resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    NotFound,
}

/// Finds and parses the client credentials file.
#[derive(Debug, Clone)]
pub struct CredentialLoader {
    env_path: Option<PathBuf>,
    default_path: PathBuf,
}

impl CredentialLoader {
    pub fn new(env_path: Option<PathBuf>, default_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path,
            default_path: default_path.into(),
        }
    }

    pub fn from_env(env: &EnvOverrides) -> Self {
        Self::new(env.credentials_path.clone(), env.default_credentials_path())
    }

    /// Runs one resolver.
    ///
    /// A path that was named explicitly (argument or environment) but does
    /// not exist is an error rather than a miss, so a typo never falls
    /// through to a different file.
    pub fn resolve_with(
        &self,
        resolver: Resolver,
        explicit: Option<&Path>,
    ) -> AuthResult<Resolution> {
        let (candidate, named) = match resolver {
            Resolver::ExplicitPath => (explicit.map(Path::to_path_buf), true),
            Resolver::Environment => (self.env_path.clone(), true),
            Resolver::DefaultLocation => (Some(self.default_path.clone()), false),
        };

        match candidate {
            Some(path) if path.is_file() => Ok(Resolution::Found(path)),
            Some(path) if named => Err(AuthError::credentials_not_found(format!(
                "credentials file from {} not found: {}",
                resolver.describe(),
                path.display()
            ))),
            _ => Ok(Resolution::NotFound),
        }
    }

    /// Walks the resolver chain and returns the first file found.
    pub fn resolve(&self, explicit: Option<&Path>) -> AuthResult<PathBuf> {
        for resolver in Resolver::ORDER {
            if let Resolution::Found(path) = self.resolve_with(resolver, explicit)? {
                debug!(path = %path.display(), resolver = ?resolver, "resolved credentials file");
                return Ok(path);
            }
        }
        Err(AuthError::credentials_not_found(format!(
            "no OAuth credentials found. Pass a credentials file, set \
             GOOGLE_OAUTH_CREDENTIALS, or place the Google Cloud Console JSON at {}",
            self.default_path.display()
        )))
    }

    /// Resolves and parses the client credentials.
    pub fn load(&self, explicit: Option<&Path>) -> AuthResult<ClientCredentials> {
        let path = self.resolve(explicit)?;
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AuthError::credentials_not_found(format!(
                "failed to read credentials file {}: {e}",
                path.display()
            ))
            .with_source(e)
        })?;
        ClientCredentials::from_json(&content)
    }
}
