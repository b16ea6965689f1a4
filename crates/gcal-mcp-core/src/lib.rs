//! Core types shared by the gcal-mcp crates: account modes, resolved
//! environment inputs, default paths and tracing setup.

pub mod env;
pub mod mode;
pub mod tracing;

pub use env::EnvOverrides;
pub use mode::{AccountMode, ModeParseError};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
