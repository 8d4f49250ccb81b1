// src/config/validate.rs

use crate::config::model::RunnerSettings;
use crate::errors::{MlrunError, Result};

pub fn validate_settings(settings: &RunnerSettings) -> Result<()> {
    validate_intervals(settings)?;
    if let Some(server) = &settings.server {
        validate_server_uri(server)?;
    }
    validate_tensorboard(settings)?;
    Ok(())
}

fn validate_intervals(settings: &RunnerSettings) -> Result<()> {
    let checks = [
        ("heartbeat_interval_secs", settings.heartbeat_interval_secs),
        ("collect_interval_secs", settings.collect_interval_secs),
        ("http_timeout_secs", settings.http_timeout_secs),
        ("tensorboard.timeout_secs", settings.tensorboard.timeout_secs),
    ];
    for (name, value) in checks {
        if value == 0 {
            return Err(MlrunError::Config(format!("{name} must be >= 1 (got 0)")));
        }
    }
    Ok(())
}

fn validate_tensorboard(settings: &RunnerSettings) -> Result<()> {
    match settings.tensorboard.command.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(MlrunError::Config(
            "[tensorboard].command must name a program".to_string(),
        )),
    }
}

/// The store must be reached over HTTP or HTTPS.
pub fn validate_server_uri(server: &str) -> Result<()> {
    let scheme_ok = server
        .split_once("://")
        .map(|(scheme, rest)| matches!(scheme, "http" | "https") && !rest.is_empty())
        .unwrap_or(false);
    if !scheme_ok {
        return Err(MlrunError::Config(format!(
            "`server` must be HTTP or HTTPS uri: got {server}"
        )));
    }
    Ok(())
}
