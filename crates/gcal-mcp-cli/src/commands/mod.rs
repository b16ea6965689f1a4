//! Subcommand implementations.

pub mod auth;
pub mod logout;
pub mod status;

use gcal_mcp_auth::OAuthCoordinator;
use gcal_mcp_core::EnvOverrides;

use crate::config::Resolved;
use crate::error::CliResult;

/// Builds the coordinator the subcommands share.
pub fn coordinator(resolved: &Resolved, env: &EnvOverrides) -> CliResult<OAuthCoordinator> {
    Ok(
        OAuthCoordinator::from_env(env, resolved.settings.clone())?
            .with_credentials_path(resolved.credentials_file.clone()),
    )
}
