// src/exec/env.rs

//! Environment of the supervised program.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

use tracing::debug;

pub const SERVER_URI_VAR: &str = "MLSTORAGE_SERVER_URI";
pub const EXPERIMENT_ID_VAR: &str = "MLSTORAGE_EXPERIMENT_ID";
pub const WORK_DIR_VAR: &str = "PWD";
pub const UNBUFFERED_VAR: &str = "PYTHONUNBUFFERED";

/// Variables that identify an experiment and must not leak from the
/// supervisor's own environment into the child.
const STRIPPED_VARS: &[&str] = &[EXPERIMENT_ID_VAR, WORK_DIR_VAR];

/// Values the supervisor always sets for the child, whatever the user asked.
#[derive(Debug, Clone)]
pub struct ForcedEnvironment<'a> {
    pub server: &'a str,
    pub experiment_id: &'a str,
    pub work_dir: &'a Path,
}

/// Compute the child environment.
///
/// Starts from `base`, drops the inherited experiment identity, applies the
/// user `overrides`, then sets the server address, experiment id, working
/// directory and the unbuffered-output hint.
pub fn derive_child_environment<I>(
    base: I,
    overrides: &BTreeMap<String, String>,
    forced: &ForcedEnvironment<'_>,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base
        .into_iter()
        .filter(|(k, _)| !STRIPPED_VARS.contains(&k.as_str()))
        .collect();

    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    env.insert(SERVER_URI_VAR.to_string(), forced.server.to_string());
    env.insert(EXPERIMENT_ID_VAR.to_string(), forced.experiment_id.to_string());
    env.insert(
        WORK_DIR_VAR.to_string(),
        forced.work_dir.to_string_lossy().into_owned(),
    );
    env.insert(UNBUFFERED_VAR.to_string(), "1".to_string());
    env
}

/// The current process environment, skipping entries that are not valid
/// UTF-8.
pub fn current_environment() -> BTreeMap<String, String> {
    let (env, skipped) = utf8_entries(std::env::vars_os());
    if !skipped.is_empty() {
        debug!(?skipped, "not passing non UTF-8 variables to the program");
    }
    env
}

/// Split `vars` into valid UTF-8 entries and the names of the rest.
fn utf8_entries(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> (BTreeMap<String, String>, Vec<String>) {
    let mut env = BTreeMap::new();
    let mut skipped = Vec::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => {
                env.insert(key, value);
            }
            (Ok(key), Err(_)) => skipped.push(key),
            (Err(key), _) => skipped.push(key.to_string_lossy().into_owned()),
        }
    }
    (env, skipped)
}
