// src/logging.rs

//! Logging setup for `mlrun` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `MLRUN_LOG` environment variable (e.g. "info", "debug")
//! 3. `debug` when the run is started with `--debug`
//! 4. default to `info`
//!
//! Logs are sent to STDERR; STDOUT carries only the program's mirrored
//! console output.

use anyhow::Result;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "MLRUN_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, debug_run: bool) -> Result<()> {
    let env_level = std::env::var(LOG_ENV_VAR).ok();
    let level = resolve_level(cli_level, env_level.as_deref(), debug_run);

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}

fn resolve_level(cli_level: Option<LogLevel>, env_level: Option<&str>, debug_run: bool) -> tracing::Level {
    if let Some(lvl) = cli_level {
        return level_from_log_level(lvl);
    }
    if let Some(lvl) = env_level.and_then(parse_level_str) {
        return lvl;
    }
    if debug_run {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn flag_beats_env_beats_debug() {
        assert_eq!(resolve_level(Some(LogLevel::Warn), Some("trace"), true), Level::WARN);
        assert_eq!(resolve_level(None, Some("Trace "), true), Level::TRACE);
        assert_eq!(resolve_level(None, Some("bogus"), true), Level::DEBUG);
        assert_eq!(resolve_level(None, None, false), Level::INFO);
    }
}
