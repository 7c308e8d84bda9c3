//! stderr logging
//!
//! stdout carries the output ResourceList, so every event goes to stderr.
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::EnvFilter;

use crate::error::{CliError, Result};

pub const DEFAULT_LEVEL: &str = "info";

/// Map a configured level name to a tracing filter directive
pub fn parse_level(level: &str) -> Result<&'static str> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "fatal" | "panic" => Ok("error"),
        "off" | "disabled" => Ok("off"),
        other => Err(CliError::input_with_help(
            format!("could not parse log level '{}'", other),
            "use one of trace, debug, info, warn, error, off",
        )),
    }
}

/// Install the global subscriber
pub fn init(level: &str) -> Result<()> {
    let directive = parse_level(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| CliError::internal(format!("could not initialise logging: {}", e)))
}
