//! gcal-mcp CLI entry point.

use std::error::Error as _;
use std::process::ExitCode;

use clap::Parser;
use gcal_mcp_core::{EnvOverrides, init_tracing};

use gcal_mcp_cli::cli::{Cli, Command};
use gcal_mcp_cli::commands;
use gcal_mcp_cli::config::{CliConfig, Resolved};
use gcal_mcp_cli::error::{CliError, CliResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    init_tracing(cli.tracing_config())?;
    let env = EnvOverrides::from_env();
    let config = CliConfig::load(cli.config.as_deref(), &env)?;

    let no_browser = matches!(cli.command, Command::Auth { no_browser: true, .. });
    let resolved = Resolved::new(&cli, &env, &config, no_browser)?;
    let coordinator = commands::coordinator(&resolved, &env)?;

    match cli.command {
        Command::Auth { force, .. } => {
            commands::auth::run(&coordinator, resolved.mode, force).await
        }
        Command::Status { all } => commands::status::run(&coordinator, &env, resolved.mode, all),
        Command::Logout => commands::logout::run(&coordinator, resolved.mode),
    }
}

fn report(err: &CliError) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    if let Some(hint) = err.hint() {
        eprintln!("hint: {hint}");
    }
}
