// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RunnerSettings;
use crate::config::validate::validate_settings;
use crate::errors::{MlrunError, Result};

/// Settings file looked up in the current directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "mlrun.toml";

/// Load a settings file from a given path and return the raw settings.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RunnerSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        MlrunError::Config(format!("reading settings file at {:?}: {e}", path))
    })?;

    let settings: RunnerSettings = toml::from_str(&contents)?;
    Ok(settings)
}

/// Load a settings file from path and run basic validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RunnerSettings> {
    let settings = load_from_path(&path)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Resolve the settings used by the binary.
///
/// - an explicit path must exist;
/// - otherwise `mlrun.toml` in `cwd` is used when present;
/// - otherwise the defaults apply.
pub fn load_settings(explicit: Option<&Path>, cwd: &Path) -> Result<RunnerSettings> {
    if let Some(path) = explicit {
        return load_and_validate(path);
    }

    let fallback: PathBuf = cwd.join(DEFAULT_SETTINGS_FILE);
    if fallback.is_file() {
        load_and_validate(fallback)
    } else {
        let settings = RunnerSettings::default();
        validate_settings(&settings)?;
        Ok(settings)
    }
}
