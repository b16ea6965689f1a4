//! `gcal-mcp auth`.

use chrono::Local;
use gcal_mcp_auth::{OAuthCoordinator, TokenState};
use gcal_mcp_core::AccountMode;
use tracing::info;

use crate::error::CliResult;

/// Makes sure `mode` has usable tokens, running the browser flow if needed.
///
/// With `force`, the flow runs even when valid tokens are stored.
pub async fn run(coordinator: &OAuthCoordinator, mode: AccountMode, force: bool) -> CliResult<()> {
    if !force {
        let status = coordinator.status(mode)?;
        if status.state == TokenState::Valid && !status.needs_authorization() {
            println!("Already authorized for the {mode} account.");
            println!("Use --force to re-authorize.");
            return Ok(());
        }
    }

    println!("Starting Google Calendar authorization ({mode} account)...");
    if coordinator.settings().open_browser {
        println!("A browser window will open for you to grant access.");
    }
    println!();

    let client = if force {
        coordinator.authorize_interactive(mode).await?
    } else {
        coordinator.get_authorized_client(mode).await?
    };

    info!(mode = %mode, "authorization successful");
    println!("Authorization successful!");
    println!(
        "Access token valid until {}.",
        client
            .expires_at()
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
    );
    Ok(())
}
