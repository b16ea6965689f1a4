//! Token endpoint client.
//!
//! [`TokenEndpoint`] is the seam between the lifecycle logic and the
//! provider's HTTP API. [`GoogleTokenClient`] talks to Google; tests plug in
//! their own implementations.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::credentials::ClientCredentials;
use crate::error::{AuthError, AuthResult};
use crate::tokens::TokenResponse;

/// Google's OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Boxed future returned by [`TokenEndpoint`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Authorization-code and refresh-token grants against a token endpoint.
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code (with its PKCE verifier) for tokens.
    fn exchange_code<'a>(
        &'a self,
        credentials: &'a ClientCredentials,
        code: &'a str,
        code_verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>>;

    /// Obtains a new access token from a refresh token.
    ///
    /// A grant the provider no longer honours is reported as
    /// `ReauthorizationRequired`.
    fn refresh<'a>(
        &'a self,
        credentials: &'a ClientCredentials,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>>;
}

/// Error body of an OAuth 2.0 token endpoint (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// reqwest-backed client for Google's token endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTokenClient {
    http_client: reqwest::Client,
    token_url: String,
}

impl GoogleTokenClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("gcal-mcp/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AuthError::internal(format!("failed to create HTTP client: {e}")).with_source(e)
            })?;
        Ok(Self::with_http_client(http_client))
    }

    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    async fn post_form(&self, grant: &str, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        debug!(grant, url = %self.token_url, "calling token endpoint");
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                AuthError::network(format!("{grant} request failed: {e}")).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read token response: {e}")).with_source(e)
        })?;

        if !status.is_success() {
            return Err(classify_failure(grant, status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            AuthError::provider(status.as_u16(), format!("invalid token response: {e}"))
                .with_source(e)
        })
    }
}

/// Maps a non-success token endpoint response onto an error code.
///
/// `invalid_grant` means the code or refresh token was revoked, expired or
/// already used; retrying without the user cannot help.
fn classify_failure(grant: &str, status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(payload) if payload.error == "invalid_grant" => AuthError::reauthorization_required(
            format!(
                "{grant} rejected: invalid_grant{}",
                describe(payload.error_description.as_deref())
            ),
        ),
        Ok(payload) => AuthError::provider(
            status,
            format!(
                "{grant} failed ({status}): {}{}",
                payload.error,
                describe(payload.error_description.as_deref())
            ),
        ),
        Err(_) => AuthError::provider(status, format!("{grant} failed ({status}): {body}")),
    }
}

fn describe(description: Option<&str>) -> String {
    description
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl TokenEndpoint for GoogleTokenClient {
    fn exchange_code<'a>(
        &'a self,
        credentials: &'a ClientCredentials,
        code: &'a str,
        code_verifier: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            let params = [
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ];
            let response = self.post_form("token exchange", &params).await?;
            info!("obtained tokens from authorization code");
            Ok(response)
        })
    }

    fn refresh<'a>(
        &'a self,
        credentials: &'a ClientCredentials,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenResponse>> {
        Box::pin(async move {
            let params = [
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ];
            let response = self.post_form("token refresh", &params).await?;
            info!("refreshed access token");
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> GoogleTokenClient {
        GoogleTokenClient::with_http_client(http(Duration::from_secs(5)))
            .with_token_url(server.url("/token"))
    }

    fn http(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap()
    }

    fn credentials() -> ClientCredentials {
        ClientCredentials::new("client-id", "client-secret")
    }

    #[test]
    fn new_builds_a_client() {
        assert!(GoogleTokenClient::new(Duration::from_secs(30)).is_ok());
    }

    #[tokio::test]
    async fn exchange_code_posts_form() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=authorization_code")
                    .body_contains("code=auth-code")
                    .body_contains("code_verifier=verifier");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "ya29.new",
                    "refresh_token": "1//refresh",
                    "expires_in": 3599,
                    "scope": "https://www.googleapis.com/auth/calendar",
                    "token_type": "Bearer"
                }));
            })
            .await;

        let response = client(&server)
            .exchange_code(
                &credentials(),
                "auth-code",
                "verifier",
                "http://127.0.0.1:3000/oauth2callback",
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.access_token, "ya29.new");
        assert_eq!(response.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(response.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn refresh_without_new_refresh_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/token")
                    .body_contains("grant_type=refresh_token");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "ya29.refreshed",
                    "expires_in": 3599
                }));
            })
            .await;

        let response = client(&server)
            .refresh(&credentials(), "1//refresh")
            .await
            .unwrap();
        assert_eq!(response.access_token, "ya29.refreshed");
        assert!(response.refresh_token.is_none());
    }

    #[tokio::test]
    async fn invalid_grant_requires_reauthorization() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(400).json_body(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Token has been expired or revoked."
                }));
            })
            .await;

        let err = client(&server)
            .refresh(&credentials(), "revoked")
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ReauthorizationRequired);
        assert!(err.message().contains("revoked"));
    }

    #[tokio::test]
    async fn server_error_keeps_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(503).body("backend unavailable");
            })
            .await;

        let err = client(&server)
            .exchange_code(&credentials(), "code", "verifier", "http://127.0.0.1:3000/cb")
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ProviderError);
        assert_eq!(err.status(), Some(503));
        assert!(err.message().contains("backend unavailable"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invalid_client_is_a_provider_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(401).json_body(serde_json::json!({
                    "error": "invalid_client",
                    "error_description": "The OAuth client was not found."
                }));
            })
            .await;

        let err = client(&server)
            .refresh(&credentials(), "refresh")
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ProviderError);
        assert!(err.message().contains("invalid_client"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let client = GoogleTokenClient::with_http_client(http(Duration::from_secs(2)))
            .with_token_url("http://127.0.0.1:1/token");
        let err = client
            .refresh(&credentials(), "refresh")
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::NetworkError);
    }
}
