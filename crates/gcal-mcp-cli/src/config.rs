//! CLI configuration.
//!
//! Settings live in `config.toml` inside the gcal-mcp config directory
//! (`~/.config/google-calendar-mcp/config.toml` by default). Every key is
//! optional; command-line flags and environment variables take precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gcal_mcp_auth::AuthSettings;
use gcal_mcp_core::{AccountMode, EnvOverrides};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::{CliError, CliResult};

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Authorization settings.
    pub auth: AuthFileSettings,
}

/// The `[auth]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthFileSettings {
    /// Path to the OAuth client credentials JSON file.
    pub credentials_file: Option<PathBuf>,

    /// Account mode used when neither `--mode` nor the environment picks one.
    pub account_mode: Option<AccountMode>,

    /// OAuth scopes to request.
    pub scopes: Option<Vec<String>>,

    /// First port of the loopback callback range.
    pub port_start: Option<u16>,

    /// Last port of the loopback callback range.
    pub port_end: Option<u16>,

    /// Seconds to wait for the browser to come back.
    pub callback_timeout_secs: Option<u64>,

    /// Whether to launch the default browser.
    pub open_browser: Option<bool>,
}

impl CliConfig {
    /// Loads the configuration.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>, env: &EnvOverrides) -> CliResult<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path(env);
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("failed to parse config {}: {e}", path.display()))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path(env: &EnvOverrides) -> PathBuf {
        env.config_dir().join("config.toml")
    }

    /// Builds the auth settings from the defaults and the `[auth]` section.
    pub fn auth_settings(&self) -> CliResult<AuthSettings> {
        let auth = &self.auth;
        let mut settings = AuthSettings::default();

        if let Some(scopes) = &auth.scopes {
            settings = settings.with_scopes(scopes.clone());
        }
        if auth.port_start.is_some() || auth.port_end.is_some() {
            let (default_start, default_end) = settings.port_range;
            let start = auth.port_start.unwrap_or(default_start);
            let end = auth.port_end.unwrap_or(end_for(start, default_start, default_end));
            settings = settings.with_port_range(start, end);
        }
        if let Some(secs) = auth.callback_timeout_secs {
            settings = settings.with_callback_timeout(Duration::from_secs(secs));
        }
        if let Some(open) = auth.open_browser {
            settings = settings.with_open_browser(open);
        }

        settings
            .validate()
            .map_err(|e| CliError::Config(format!("invalid [auth] settings: {e}")))?;
        Ok(settings)
    }
}

/// Keeps the default range width when only `port_start` is given.
fn end_for(start: u16, default_start: u16, default_end: u16) -> u16 {
    start.saturating_add(default_end - default_start)
}

/// Settings resolved from flags, environment, config file and defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub mode: AccountMode,
    /// Credentials path to pass as the explicit source, if any.
    pub credentials_file: Option<PathBuf>,
    pub settings: AuthSettings,
}

impl Resolved {
    /// Applies precedence: flag, then environment, then file, then default.
    pub fn new(
        cli: &Cli,
        env: &EnvOverrides,
        config: &CliConfig,
        no_browser: bool,
    ) -> CliResult<Self> {
        let mode = match (cli.mode, env.account_mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => raw.parse()?,
            (None, None) => config.auth.account_mode.unwrap_or_default(),
        };

        // The environment path is handled by the credential loader, ahead of
        // the config file but behind the flag.
        let credentials_file = match (&cli.credentials_file, &env.credentials_path) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(_)) => None,
            (None, None) => config.auth.credentials_file.clone(),
        };

        let mut settings = config.auth_settings()?;
        if no_browser {
            settings = settings.with_open_browser(false);
        }

        Ok(Self {
            mode,
            credentials_file,
            settings,
        })
    }
}
