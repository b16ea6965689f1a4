//! Persistent token storage.
//!
//! A single JSON file maps each [`AccountMode`] to its [`TokenSet`]:
//!
//! ```json
//! {
//!   "normal": { "access_token": "...", "refresh_token": "...", "expiry_date": 1700000000000, "scope": "..." },
//!   "test":   { ... }
//! }
//! ```
//!
//! Every mutation rewrites the whole map through a temp file and a rename,
//! so a crash leaves either the old or the new file, never a torn one.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gcal_mcp_core::{AccountMode, EnvOverrides};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::tokens::TokenSet;

/// On-disk shape: mode name to token set.
pub type TokenMap = BTreeMap<AccountMode, TokenSet>;

/// Persistence abstraction for per-mode token sets.
pub trait TokenStore: Send + Sync {
    /// Returns the tokens for `mode`, or `None` if none were saved.
    fn load(&self, mode: AccountMode) -> AuthResult<Option<TokenSet>>;
    /// Replaces the tokens for `mode`, leaving other modes untouched.
    fn save(&self, mode: AccountMode, tokens: &TokenSet) -> AuthResult<()>;
    /// Removes the tokens for `mode`, leaving other modes untouched.
    fn delete(&self, mode: AccountMode) -> AuthResult<()>;
}

/// Accepted legacy file contents.
#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyFile {
    Map(TokenMap),
    Single(TokenSet),
}

impl LegacyFile {
    fn into_map(self) -> TokenMap {
        match self {
            Self::Map(map) => map,
            Self::Single(tokens) => TokenMap::from([(AccountMode::Normal, tokens)]),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    migration_checked: bool,
}

/// Token store backed by a JSON file with owner-only permissions.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    legacy_path: Option<PathBuf>,
    remove_legacy: bool,
    state: Mutex<StoreState>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            legacy_path: None,
            remove_legacy: false,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Store at the default location, migrating from the legacy location.
    pub fn from_env(env: &EnvOverrides) -> Self {
        Self::new(env.token_path()).with_legacy_path(env.legacy_token_path())
    }

    /// Sets a previously used token file to migrate from.
    pub fn with_legacy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_path = Some(path.into());
        self
    }

    /// Deletes the legacy file once its contents have been copied forward.
    pub fn with_remove_legacy(mut self, remove: bool) -> Self {
        self.remove_legacy = remove;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locks the store and runs the one-time legacy check.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.migration_checked {
            state.migration_checked = true;
            self.migrate_legacy();
        }
        state
    }

    /// Copies a legacy token file forward if no current file exists.
    ///
    /// Failures are logged and otherwise ignored: the store then starts
    /// empty and the user re-authorizes.
    fn migrate_legacy(&self) {
        let Some(legacy) = self.legacy_path.as_deref() else {
            return;
        };
        if self.path.exists() || !legacy.is_file() {
            return;
        }

        let migrated = fs::read_to_string(legacy)
            .map_err(|e| AuthError::storage(format!("failed to read legacy token file: {e}")))
            .and_then(|content| {
                serde_json::from_str::<LegacyFile>(&content).map_err(|e| {
                    AuthError::store_corrupt(format!("failed to parse legacy token file: {e}"))
                })
            })
            .and_then(|file| self.write_map(&file.into_map()));

        match migrated {
            Ok(()) => {
                info!(
                    from = %legacy.display(),
                    to = %self.path.display(),
                    "migrated legacy token file"
                );
                if self.remove_legacy
                    && let Err(e) = fs::remove_file(legacy)
                {
                    warn!(
                        path = %legacy.display(),
                        error = %e,
                        "failed to remove legacy token file"
                    );
                }
            }
            Err(e) => {
                warn!(
                    path = %legacy.display(),
                    error = %e,
                    "legacy token migration failed, starting empty"
                );
            }
        }
    }

    fn read_map(&self) -> AuthResult<TokenMap> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file");
                return Ok(TokenMap::new());
            }
            Err(e) => {
                return Err(AuthError::storage(format!(
                    "failed to read token file {}: {e}",
                    self.path.display()
                ))
                .with_source(e));
            }
        };

        if content.trim().is_empty() {
            return Ok(TokenMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            AuthError::store_corrupt(format!(
                "failed to parse token file {}: {e}",
                self.path.display()
            ))
            .with_source(e)
        })
    }

    /// Reads the map for a read-modify-write cycle. A corrupt file cannot be
    /// salvaged, so it is replaced rather than blocking new tokens.
    fn read_map_for_update(&self) -> AuthResult<TokenMap> {
        match self.read_map() {
            Err(e) if e.code() == crate::error::AuthErrorCode::TokenStoreCorrupt => {
                warn!(path = %self.path.display(), error = %e, "replacing corrupt token file");
                Ok(TokenMap::new())
            }
            other => other,
        }
    }

    fn write_map(&self, map: &TokenMap) -> AuthResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::storage(format!("failed to create token directory: {e}")).with_source(e)
            })?;
        }

        let content = serde_json::to_string_pretty(map).map_err(|e| {
            AuthError::internal(format!("failed to serialize tokens: {e}")).with_source(e)
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        write_private(&temp_path, content.as_bytes()).map_err(|e| {
            AuthError::storage(format!("failed to write token file: {e}")).with_source(e)
        })?;

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(
                AuthError::storage(format!("failed to rename token file: {e}")).with_source(e),
            );
        }

        debug!(path = %self.path.display(), modes = map.len(), "saved token file");
        Ok(())
    }
}

/// Writes `bytes` to a fresh file readable only by the owner.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        // mode() only applies when the file is created
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()
}

impl TokenStore for FileTokenStore {
    fn load(&self, mode: AccountMode) -> AuthResult<Option<TokenSet>> {
        let _state = self.lock();
        let mut map = self.read_map()?;
        Ok(map.remove(&mode))
    }

    fn save(&self, mode: AccountMode, tokens: &TokenSet) -> AuthResult<()> {
        let _state = self.lock();
        let mut map = self.read_map_for_update()?;
        map.insert(mode, tokens.clone());
        self.write_map(&map)?;
        info!(mode = %mode, "stored tokens");
        Ok(())
    }

    fn delete(&self, mode: AccountMode) -> AuthResult<()> {
        let _state = self.lock();
        let mut map = self.read_map_for_update()?;
        if map.remove(&mode).is_none() {
            return Ok(());
        }
        // An empty map stays on disk: its presence marks any legacy file as
        // already migrated.
        self.write_map(&map)?;
        info!(mode = %mode, "removed tokens");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample(access: &str) -> TokenSet {
        TokenSet {
            access_token: access.to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry_date: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            scope: ["https://www.googleapis.com/auth/calendar".to_string()]
                .into_iter()
                .collect(),
            token_type: Some("Bearer".to_string()),
        }
    }

    fn store(dir: &TempDir) -> FileTokenStore {
        FileTokenStore::new(dir.path().join("config").join("tokens.json"))
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load(AccountMode::Normal).unwrap().is_none());
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tokens = sample("access");
        store.save(AccountMode::Normal, &tokens).unwrap();

        let reopened = FileTokenStore::new(store.path());
        assert_eq!(reopened.load(AccountMode::Normal).unwrap(), Some(tokens));
    }

    #[test]
    fn modes_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(AccountMode::Normal, &sample("normal")).unwrap();
        store.save(AccountMode::Test, &sample("test")).unwrap();

        store.delete(AccountMode::Test).unwrap();
        assert!(store.load(AccountMode::Test).unwrap().is_none());
        assert_eq!(
            store.load(AccountMode::Normal).unwrap().unwrap().access_token,
            "normal"
        );
    }

    #[test]
    fn deleting_last_mode_keeps_empty_map() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(AccountMode::Test, &sample("test")).unwrap();
        store.delete(AccountMode::Test).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap().trim(), "{}");
        assert!(store.load(AccountMode::Test).unwrap().is_none());
        store.delete(AccountMode::Test).unwrap();
    }

    #[test]
    fn signed_out_legacy_tokens_stay_gone_after_restart() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".gcp-saved-tokens.json");
        fs::write(&legacy, serde_json::to_string(&sample("legacy")).unwrap()).unwrap();

        let first = store(&dir).with_legacy_path(&legacy);
        assert!(first.load(AccountMode::Normal).unwrap().is_some());
        first.delete(AccountMode::Normal).unwrap();
        assert!(legacy.exists());

        let restarted = store(&dir).with_legacy_path(&legacy);
        assert!(restarted.load(AccountMode::Normal).unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_reported_on_load() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        let err = store.load(AccountMode::Normal).unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::TokenStoreCorrupt);
    }

    #[test]
    fn save_replaces_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "garbage").unwrap();
        store.save(AccountMode::Normal, &sample("fresh")).unwrap();
        assert!(store.load(AccountMode::Normal).unwrap().is_some());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(AccountMode::Normal, &sample("a")).unwrap();
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(AccountMode::Normal, &sample("a")).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn migrates_single_token_legacy_file() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join(".gcp-saved-tokens.json");
        fs::write(&legacy, serde_json::to_string(&sample("legacy")).unwrap()).unwrap();

        let store = store(&dir).with_legacy_path(&legacy);
        let loaded = store.load(AccountMode::Normal).unwrap().unwrap();
        assert_eq!(loaded.access_token, "legacy");
        assert!(store.path().exists());
        assert!(legacy.exists());
    }

    #[test]
    fn migrates_map_legacy_file_and_removes_it() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("old.json");
        let map = TokenMap::from([(AccountMode::Test, sample("old-test"))]);
        fs::write(&legacy, serde_json::to_string(&map).unwrap()).unwrap();

        let store = store(&dir)
            .with_legacy_path(&legacy)
            .with_remove_legacy(true);
        store.save(AccountMode::Normal, &sample("new")).unwrap();

        assert_eq!(
            store.load(AccountMode::Test).unwrap().unwrap().access_token,
            "old-test"
        );
        assert_eq!(
            store.load(AccountMode::Normal).unwrap().unwrap().access_token,
            "new"
        );
        assert!(!legacy.exists());
    }

    #[test]
    fn existing_file_wins_over_legacy() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("old.json");
        fs::write(&legacy, serde_json::to_string(&sample("legacy")).unwrap()).unwrap();

        store(&dir).save(AccountMode::Normal, &sample("current")).unwrap();
        let store = store(&dir).with_legacy_path(&legacy);
        assert_eq!(
            store.load(AccountMode::Normal).unwrap().unwrap().access_token,
            "current"
        );
    }

    #[test]
    fn broken_legacy_file_means_empty_store() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("old.json");
        fs::write(&legacy, "][").unwrap();

        let store = store(&dir).with_legacy_path(&legacy);
        assert!(store.load(AccountMode::Normal).unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn file_format_is_keyed_by_mode() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(AccountMode::Test, &sample("t")).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["test"]["access_token"], "t");
        assert_eq!(raw["test"]["expiry_date"], 1_700_000_000_123_i64);
    }
}
