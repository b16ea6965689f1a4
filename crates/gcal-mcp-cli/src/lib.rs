//! Command-line front end for Google Calendar MCP authorization
//!
//! This crate provides the `gcal-mcp` binary: `auth`, `status` and `logout`
//! on top of [`gcal_mcp_auth::OAuthCoordinator`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::{CliConfig, Resolved};
pub use error::{CliError, CliResult};
