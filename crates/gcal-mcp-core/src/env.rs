//! Environment inputs and default file locations.
//!
//! The environment is read once into an [`EnvOverrides`] snapshot and passed
//! down explicitly. Nothing below this module calls `std::env::var`.

use std::path::PathBuf;

/// Path to the OAuth client credentials JSON file.
pub const CREDENTIALS_PATH_VAR: &str = "GOOGLE_OAUTH_CREDENTIALS";
/// Account mode override (`normal` or `test`).
pub const ACCOUNT_MODE_VAR: &str = "GOOGLE_ACCOUNT_MODE";
/// Base directory holding the token file and default credentials.
pub const CONFIG_DIR_VAR: &str = "GOOGLE_CALENDAR_MCP_CONFIG_DIR";
/// Full path of the token file, bypassing the config directory.
pub const TOKEN_PATH_VAR: &str = "GOOGLE_CALENDAR_MCP_TOKEN_PATH";

const APP_DIR: &str = "google-calendar-mcp";
const TOKEN_FILE: &str = "tokens.json";
const CREDENTIALS_FILE: &str = "gcp-oauth.keys.json";
const LEGACY_TOKEN_FILE: &str = ".gcp-saved-tokens.json";

/// Snapshot of the environment variables the auth core consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub credentials_path: Option<PathBuf>,
    pub account_mode: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
}

impl EnvOverrides {
    /// Reads the process environment. Empty values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the snapshot from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            credentials_path: get(CREDENTIALS_PATH_VAR).map(PathBuf::from),
            account_mode: get(ACCOUNT_MODE_VAR),
            config_dir: get(CONFIG_DIR_VAR).map(PathBuf::from),
            token_path: get(TOKEN_PATH_VAR).map(PathBuf::from),
        }
    }

    /// Directory holding gcal-mcp state.
    ///
    /// `GOOGLE_CALENDAR_MCP_CONFIG_DIR` if set, otherwise
    /// `$XDG_CONFIG_HOME/google-calendar-mcp` (or the platform equivalent).
    pub fn config_dir(&self) -> PathBuf {
        match &self.config_dir {
            Some(dir) => dir.clone(),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR),
        }
    }

    /// Current location of the token store file.
    pub fn token_path(&self) -> PathBuf {
        match &self.token_path {
            Some(path) => path.clone(),
            None => self.config_dir().join(TOKEN_FILE),
        }
    }

    /// Conventional location of the client credentials file.
    pub fn default_credentials_path(&self) -> PathBuf {
        self.config_dir().join(CREDENTIALS_FILE)
    }

    /// Token file location used by earlier releases, relative to the
    /// working directory.
    pub fn legacy_token_path(&self) -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(LEGACY_TOKEN_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_all_variables() {
        let env = EnvOverrides::from_lookup(lookup(&[
            (CREDENTIALS_PATH_VAR, "/keys/creds.json"),
            (ACCOUNT_MODE_VAR, "test"),
            (CONFIG_DIR_VAR, "/state"),
            (TOKEN_PATH_VAR, "/state/custom.json"),
        ]));
        assert_eq!(env.credentials_path, Some(PathBuf::from("/keys/creds.json")));
        assert_eq!(env.account_mode.as_deref(), Some("test"));
        assert_eq!(env.config_dir(), PathBuf::from("/state"));
        assert_eq!(env.token_path(), PathBuf::from("/state/custom.json"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let env = EnvOverrides::from_lookup(lookup(&[(ACCOUNT_MODE_VAR, "  ")]));
        assert!(env.account_mode.is_none());
    }

    #[test]
    fn paths_derive_from_config_dir() {
        let env = EnvOverrides {
            config_dir: Some(PathBuf::from("/cfg")),
            ..Default::default()
        };
        assert_eq!(env.token_path(), PathBuf::from("/cfg/tokens.json"));
        assert_eq!(
            env.default_credentials_path(),
            PathBuf::from("/cfg/gcp-oauth.keys.json")
        );
    }

    #[test]
    fn default_config_dir_is_app_specific() {
        let env = EnvOverrides::default();
        assert!(env.config_dir().ends_with("google-calendar-mcp"));
        assert!(env.legacy_token_path().ends_with(".gcp-saved-tokens.json"));
    }
}
