//! Log output for the gcal-mcp binaries.
//!
//! Logs always go to stderr. Under an MCP host stdout carries protocol
//! frames, so nothing here may write to it.
//!
//! ```ignore
//! use gcal_mcp_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, fmt::format::FmtSpan, prelude::*};

/// Crates whose events the default directive enables.
const CRATES: [&str; 4] = ["gcal_mcp", "gcal_mcp_core", "gcal_mcp_auth", "gcal_mcp_cli"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Line format of stderr logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    Pretty,
    #[default]
    Compact,
    /// One JSON object per line, for hosts that collect structured logs.
    Json,
}

/// How [`init_tracing`] sets up the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for the gcal-mcp crates when no filter is given.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Adds file and line to each event.
    pub with_location: bool,
    pub with_target: bool,
    pub with_time: bool,
    /// Logs span open and close, which times token refreshes and exchanges.
    pub with_span_events: bool,
    /// Explicit filter directive. Takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Compact,
            with_location: false,
            with_target: true,
            with_time: true,
            with_span_events: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Interactive commands: warnings only, no timestamps or targets.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            level: Level::WARN,
            with_target: false,
            with_time: false,
            ..Self::default()
        }
    }

    /// `gcal-mcp --debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            with_location: true,
            with_time: false,
            with_span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Directive used when neither `filter` nor `RUST_LOG` is set.
    ///
    /// Third-party crates (reqwest, hyper) stay at their own defaults, which
    /// means off.
    pub fn default_directive(&self) -> String {
        CRATES
            .iter()
            .map(|krate| format!("{krate}={}", self.level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.filter {
            Some(filter) => Ok(EnvFilter::try_new(filter)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    fn stderr_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.with_span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(self.with_location)
            .with_line_number(self.with_location)
            .with_target(self.with_target)
            .with_span_events(span_events);

        match (self.format, self.with_time) {
            (TracingOutputFormat::Json, _) => base.json().boxed(),
            (TracingOutputFormat::Pretty, true) => base.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => base.compact().boxed(),
            (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber. Call once, at process start.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    let subscriber = Registry::default()
        .with(config.stderr_layer())
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
