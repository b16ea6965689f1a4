//! `gcal-mcp status`.

use chrono::{DateTime, Utc};
use gcal_mcp_auth::{AuthStatus, OAuthCoordinator, TokenState};
use gcal_mcp_core::{AccountMode, EnvOverrides};

use crate::error::CliResult;

/// Prints the stored authorization state of `mode`, or of every mode.
pub fn run(
    coordinator: &OAuthCoordinator,
    env: &EnvOverrides,
    mode: AccountMode,
    all: bool,
) -> CliResult<()> {
    println!("Token file: {}", env.token_path().display());
    let modes: Vec<AccountMode> = if all {
        AccountMode::ALL.to_vec()
    } else {
        vec![mode]
    };
    let now = Utc::now();
    for mode in modes {
        let status = coordinator.status(mode)?;
        println!("{}", describe(&status, now));
    }
    Ok(())
}

/// One line per mode, e.g. `normal: valid, expires 2026-10-18 14:03 UTC (in 52m)`.
pub fn describe(status: &AuthStatus, now: DateTime<Utc>) -> String {
    let mut line = format!("{}: {}", status.mode, status.state);

    if let Some(expires_at) = status.expires_at {
        let remaining = expires_at - now;
        let relative = if remaining.num_seconds() >= 0 {
            format!("in {}", humanize(remaining))
        } else {
            format!("{} ago", humanize(-remaining))
        };
        line.push_str(&format!(
            ", expires {} ({relative})",
            expires_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    if matches!(status.state, TokenState::ExpiringSoon | TokenState::Expired) {
        line.push_str(if status.has_refresh_token {
            ", will refresh on next use"
        } else {
            ", no refresh token"
        });
    }

    if !status.missing_scopes.is_empty() {
        line.push_str(&format!(", missing scopes: {}", status.missing_scopes.join(" ")));
    }

    if status.needs_authorization() {
        line.push_str(" - run `gcal-mcp auth`");
    }
    line
}

fn humanize(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes();
    if minutes < 1 {
        format!("{}s", duration.num_seconds())
    } else if minutes < 60 {
        format!("{minutes}m")
    } else {
        format!("{}h{:02}m", minutes / 60, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 13, 11, 0).unwrap()
    }

    fn status(state: TokenState, expires_in: Option<i64>, refresh: bool) -> AuthStatus {
        AuthStatus {
            mode: AccountMode::Normal,
            state,
            expires_at: expires_in.map(|secs| now() + Duration::seconds(secs)),
            has_refresh_token: refresh,
            missing_scopes: Vec::new(),
        }
    }

    #[test]
    fn missing_tokens() {
        assert_eq!(
            describe(&status(TokenState::Missing, None, false), now()),
            "normal: not authorized - run `gcal-mcp auth`"
        );
    }

    #[test]
    fn valid_tokens() {
        assert_eq!(
            describe(&status(TokenState::Valid, Some(52 * 60), true), now()),
            "normal: valid, expires 2026-10-18 14:03 UTC (in 52m)"
        );
    }

    #[test]
    fn expired_with_refresh_token() {
        assert_eq!(
            describe(&status(TokenState::Expired, Some(-2 * 3600), true), now()),
            "normal: expired, expires 2026-10-18 11:11 UTC (2h00m ago), will refresh on next use"
        );
    }

    #[test]
    fn expiring_without_refresh_token_needs_auth() {
        let line = describe(&status(TokenState::ExpiringSoon, Some(30), false), now());
        assert_eq!(
            line,
            "normal: expiring soon, expires 2026-10-18 13:11 UTC (in 30s), no refresh token - run `gcal-mcp auth`"
        );
    }

    #[test]
    fn missing_scopes_are_listed() {
        let mut s = status(TokenState::Valid, Some(3600), true);
        s.missing_scopes = vec!["https://www.googleapis.com/auth/calendar".to_string()];
        assert!(
            describe(&s, now()).contains("missing scopes: https://www.googleapis.com/auth/calendar")
        );
    }
}
