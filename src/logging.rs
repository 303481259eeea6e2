// src/logging.rs

//! Logging setup for `pkbridge` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. `--log-level` (applies to every target)
//! 2. `PKBRIDGE_LOG`, in `EnvFilter` syntax, e.g. `info,pkbridge::ops=debug`
//! 3. `info`
//!
//! Logs go to stderr; stdout carries the job events only, so `--json`
//! output stays machine readable.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "PKBRIDGE_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}

/// Filter for the given CLI level and raw environment value.
///
/// A malformed environment value is an error rather than silently falling
/// back, since it usually means a typo in a module path.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = cli_level {
        return Ok(EnvFilter::new(level_directive(level)));
    }
    match env_value.map(str::trim) {
        Some(raw) if !raw.is_empty() => EnvFilter::try_new(raw)
            .with_context(|| format!("invalid {LOG_ENV} value {raw:?}")),
        _ => Ok(EnvFilter::new("info")),
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
