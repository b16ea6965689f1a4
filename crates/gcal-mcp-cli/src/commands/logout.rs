//! `gcal-mcp logout`.

use gcal_mcp_auth::{OAuthCoordinator, TokenState};
use gcal_mcp_core::AccountMode;

use crate::error::CliResult;

/// Removes the stored tokens of `mode`, leaving other modes signed in.
pub fn run(coordinator: &OAuthCoordinator, mode: AccountMode) -> CliResult<()> {
    if coordinator.status(mode)?.state == TokenState::Missing {
        println!("No stored tokens for the {mode} account.");
        return Ok(());
    }
    coordinator.sign_out(mode)?;
    println!("Signed out of the {mode} account.");
    Ok(())
}
