//! Authorization settings.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::endpoint::GOOGLE_TOKEN_URL;
use crate::pkce::GOOGLE_AUTH_URL;

/// Tunables for the OAuth flow and token lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    /// OAuth scopes to request and to require of stored tokens.
    pub scopes: Vec<String>,

    /// Inclusive loopback port range scanned for the callback listener.
    pub port_range: (u16, u16),

    /// Path the provider redirects to.
    pub callback_path: String,

    /// How long to wait for the browser to come back.
    pub callback_timeout: Duration,

    /// Time bound on reading one callback request.
    pub request_read_timeout: Duration,

    /// Tokens expiring within this margin are refreshed before use.
    pub refresh_margin: Duration,

    /// Timeout for calls to the token endpoint.
    pub http_timeout: Duration,

    /// Whether to try launching the default browser.
    pub open_browser: bool,

    pub auth_url: String,
    pub token_url: String,
}

impl AuthSettings {
    /// Read/write access to events.
    pub const SCOPE_EVENTS: &'static str = "https://www.googleapis.com/auth/calendar.events";

    /// Full calendar access.
    pub const SCOPE_CALENDAR: &'static str = "https://www.googleapis.com/auth/calendar";

    pub const DEFAULT_PORT_RANGE: (u16, u16) = (3000, 3005);
    pub const DEFAULT_CALLBACK_PATH: &'static str = "/oauth2callback";
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_REQUEST_READ_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    pub fn default_scopes() -> Vec<String> {
        vec![
            Self::SCOPE_EVENTS.to_string(),
            Self::SCOPE_CALENDAR.to_string(),
        ]
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range = (start, end);
        self
    }

    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_request_read_timeout(mut self, timeout: Duration) -> Self {
        self.request_read_timeout = timeout;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.port_range.0..=self.port_range.1
    }

    /// The refresh margin as a chrono duration, saturating on overflow.
    pub fn refresh_margin_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.refresh_margin).unwrap_or(chrono::Duration::MAX)
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }
        if self.port_range.0 == 0 || self.port_range.0 > self.port_range.1 {
            return Err(format!(
                "invalid callback port range {}-{}",
                self.port_range.0, self.port_range.1
            ));
        }
        if !self.callback_path.starts_with('/') {
            return Err(format!(
                "callback path must start with '/': {}",
                self.callback_path
            ));
        }
        if self.callback_timeout.is_zero() {
            return Err("callback timeout must be positive".to_string());
        }
        for (name, url) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            url::Url::parse(url).map_err(|e| format!("invalid {name} '{url}': {e}"))?;
        }
        Ok(())
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            scopes: Self::default_scopes(),
            port_range: Self::DEFAULT_PORT_RANGE,
            callback_path: Self::DEFAULT_CALLBACK_PATH.to_string(),
            callback_timeout: Duration::from_secs(Self::DEFAULT_CALLBACK_TIMEOUT_SECS),
            request_read_timeout: Duration::from_secs(Self::DEFAULT_REQUEST_READ_TIMEOUT_SECS),
            refresh_margin: Duration::from_secs(Self::DEFAULT_REFRESH_MARGIN_SECS),
            http_timeout: Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
            open_browser: true,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = AuthSettings::default();
        assert_eq!(settings.ports(), 3000..=3005);
        assert_eq!(settings.callback_path, "/oauth2callback");
        assert_eq!(settings.callback_timeout, Duration::from_secs(300));
        assert_eq!(settings.refresh_margin_chrono(), chrono::Duration::seconds(60));
        assert_eq!(settings.scopes.len(), 2);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let settings = AuthSettings::default()
            .with_port_range(9000, 9010)
            .with_callback_path("/cb")
            .with_callback_timeout(Duration::from_secs(5))
            .with_open_browser(false)
            .with_token_url("http://127.0.0.1:1/token");

        assert_eq!(settings.port_range, (9000, 9010));
        assert_eq!(settings.callback_path, "/cb");
        assert!(!settings.open_browser);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(AuthSettings::default().with_scopes(vec![]).validate().is_err());
        assert!(AuthSettings::default().with_port_range(10, 5).validate().is_err());
        assert!(AuthSettings::default().with_callback_path("cb").validate().is_err());
        assert!(
            AuthSettings::default()
                .with_callback_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(AuthSettings::default().with_token_url("not a url").validate().is_err());
    }
}
