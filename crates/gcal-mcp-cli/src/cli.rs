//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use gcal_mcp_core::{AccountMode, TracingConfig, TracingOutputFormat};

/// gcal-mcp - Google Calendar authorization for the MCP server
#[derive(Debug, Parser)]
#[command(name = "gcal-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "GCAL_MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log line format on stderr
    #[arg(long, value_enum, env = "GCAL_MCP_LOG_FORMAT", global = true, default_value_t)]
    pub log_format: LogFormat,

    /// Log filter directive, e.g. `gcal_mcp_auth=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Account mode whose tokens to use (normal or test)
    ///
    /// Falls back to GOOGLE_ACCOUNT_MODE, then the config file.
    #[arg(long, short, global = true)]
    pub mode: Option<AccountMode>,

    /// Path to the Google Cloud Console OAuth credentials JSON file
    ///
    /// Falls back to GOOGLE_OAUTH_CREDENTIALS, then the config file, then
    /// gcp-oauth.keys.json in the config directory.
    #[arg(long, global = true)]
    pub credentials_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Subscriber settings for the selected verbosity and format.
    pub fn tracing_config(&self) -> TracingConfig {
        let config = if self.debug {
            TracingConfig::cli_debug()
        } else {
            TracingConfig::cli()
        };
        let config = config.with_format(self.log_format.into());
        match &self.log_filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Compact => Self::Compact,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Json => Self::Json,
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize access to Google Calendar
    Auth {
        /// Run the browser flow even if valid tokens are stored
        #[arg(long, short)]
        force: bool,

        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the stored authorization state
    Status {
        /// Show every account mode instead of the selected one
        #[arg(long)]
        all: bool,
    },

    /// Remove the stored tokens of the selected account mode
    Logout,
}
