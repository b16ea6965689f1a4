//! Surfacing the consent URL to the user.

use std::sync::Arc;

use gcal_mcp_core::AccountMode;
use tracing::{info, warn};

/// Consent URL of a flow that is waiting for the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationPrompt {
    pub mode: AccountMode,
    pub url: String,
    pub port: u16,
}

/// Callback receiving the prompt as soon as the listener is up.
pub type PromptNotifier = Arc<dyn Fn(&AuthorizationPrompt) + Send + Sync>;

/// Notifier that prints the URL to stderr, keeping stdout clean.
pub fn stderr_notifier() -> PromptNotifier {
    Arc::new(|prompt: &AuthorizationPrompt| {
        eprintln!(
            "\nAuthorize Google Calendar access ({} account) by opening:\n\n{}\n",
            prompt.mode, prompt.url
        );
    })
}

/// Tries to open `url` in the default browser.
///
/// Failure is not an error: the prompt has already been shown, so the user
/// can still open the URL by hand.
pub fn open_in_browser(url: &str) -> bool {
    match open::that(url) {
        Ok(()) => {
            info!("opened browser for authorization");
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to open browser, open the authorization URL manually");
            false
        }
    }
}
