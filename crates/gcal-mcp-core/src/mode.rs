//! Account modes.
//!
//! A process works against one of a small fixed set of token slots. The
//! `test` slot lets integration suites authorize a throwaway Google account
//! without touching the user's real session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Selects which token set in the store applies to a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountMode {
    #[default]
    Normal,
    Test,
}

/// Error returned when a string names no known account mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid account mode '{0}' (expected 'normal' or 'test')")]
pub struct ModeParseError(pub String);

impl AccountMode {
    /// Every known mode, in store order.
    pub const ALL: [AccountMode; 2] = [AccountMode::Normal, AccountMode::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Test => "test",
        }
    }

    /// Resolves the mode for this process.
    ///
    /// An explicit value wins, then the environment override; anything
    /// else falls back to [`AccountMode::Normal`].
    pub fn resolve(
        explicit: Option<&str>,
        env_override: Option<&str>,
    ) -> Result<Self, ModeParseError> {
        match explicit.or(env_override) {
            Some(value) => value.parse(),
            None => Ok(Self::Normal),
        }
    }
}

impl fmt::Display for AccountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "test" => Ok(Self::Test),
            other => Err(ModeParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!("normal".parse::<AccountMode>().unwrap(), AccountMode::Normal);
        assert_eq!(" TEST ".parse::<AccountMode>().unwrap(), AccountMode::Test);
        assert_eq!(
            "staging".parse::<AccountMode>().unwrap_err(),
            ModeParseError("staging".to_string())
        );
    }

    #[test]
    fn explicit_beats_environment() {
        let mode = AccountMode::resolve(Some("test"), Some("normal")).unwrap();
        assert_eq!(mode, AccountMode::Test);
    }

    #[test]
    fn environment_used_without_explicit() {
        let mode = AccountMode::resolve(None, Some("test")).unwrap();
        assert_eq!(mode, AccountMode::Test);
    }

    #[test]
    fn falls_back_to_normal() {
        assert_eq!(AccountMode::resolve(None, None).unwrap(), AccountMode::Normal);
    }

    #[test]
    fn invalid_environment_value_is_an_error() {
        assert!(AccountMode::resolve(None, Some("prod")).is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&AccountMode::Test).unwrap();
        assert_eq!(json, "\"test\"");
        let mode: AccountMode = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(mode, AccountMode::Normal);
    }
}
