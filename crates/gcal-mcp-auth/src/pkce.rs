//! PKCE (RFC 7636) secrets and the Google authorization URL.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};

/// Google's OAuth 2.0 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Random bytes behind a verifier. 32 bytes encode to 43 characters, the
/// RFC 7636 minimum.
const VERIFIER_BYTES: usize = 32;

const STATE_BYTES: usize = 16;

/// Per-flow secrets: the code verifier, its S256 challenge and the CSRF
/// state value.
#[derive(Clone)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    /// Fresh verifier and state from the thread-local CSPRNG.
    pub fn new() -> Self {
        Self::from_parts(
            random_urlsafe::<VERIFIER_BYTES>(),
            random_urlsafe::<STATE_BYTES>(),
        )
    }

    /// Derives the challenge for a known verifier.
    pub fn from_parts(verifier: impl Into<String>, state: impl Into<String>) -> Self {
        let verifier = verifier.into();
        Self {
            challenge: URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
            verifier,
            state: state.into(),
        }
    }

    /// Consent URL sending the user back to `redirect_uri`.
    ///
    /// `access_type=offline` together with `prompt=consent` makes Google
    /// issue a refresh token on every grant, not only the first.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");
        let params = [
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("code_challenge", self.challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("state", self.state.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{auth_url}?{query}")
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceFlow")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("state", &self.state)
            .finish()
    }
}

fn random_urlsafe<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
