// src/request/build.rs

//! Turn parsed command-line arguments into an [`ExecutionRequest`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::cli::CliArgs;
use crate::config::RunnerSettings;
use crate::config::validate::validate_server_uri;
use crate::errors::{MlrunError, Result};
use crate::exec::env::{EXPERIMENT_ID_VAR, SERVER_URI_VAR};
use crate::fs::{collect_relative_files, fingerprint_for_files, is_script_file};
use crate::request::parse::{
    device_list, parse_config, parse_config_file, parse_env, parse_env_file, parse_tags,
};
use crate::request::{ExecutionRequest, TensorBoardRequest};

/// Variable receiving the `--gpu` device list.
pub const DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// Build the request for a run started from `cwd`.
///
/// `environ` is the environment of the current process; it supplies the
/// parent experiment id and the fallback server address.
pub fn build_request(
    args: &CliArgs,
    settings: &RunnerSettings,
    cwd: PathBuf,
    environ: &BTreeMap<String, String>,
) -> Result<ExecutionRequest> {
    if args.args.is_empty() {
        return Err(MlrunError::EmptyCommand);
    }

    let server = args
        .server
        .clone()
        .or_else(|| settings.server.clone())
        .or_else(|| environ.get(SERVER_URI_VAR).filter(|s| !s.is_empty()).cloned())
        .ok_or_else(|| MlrunError::Config("no record store server given".to_string()))?;
    validate_server_uri(&server)?;

    let parent_id = environ
        .get(EXPERIMENT_ID_VAR)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let (script_files, data_files) = classify_files(&args.args, &cwd);

    let name = match &args.name {
        Some(name) => name.clone(),
        None => script_files.first().cloned().ok_or_else(|| {
            MlrunError::InvalidArgument(
                "cannot infer the experiment name: no script file found".to_string(),
            )
        })?,
    };

    let mut tags: Vec<String> = Vec::new();
    for text in &args.tags {
        for tag in parse_tags(text)? {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    let mut config = BTreeMap::new();
    if let Some(path) = &args.config_file {
        config.extend(parse_config_file(Path::new(path))?);
    }
    for text in &args.config {
        config.extend(parse_config(text)?);
    }

    let mut env = BTreeMap::new();
    if let Some(path) = &args.env_file {
        env.extend(parse_env_file(Path::new(path))?);
    }
    for text in &args.env {
        let (name, value) = parse_env(text)?;
        env.insert(name, value);
    }
    if !args.gpu.is_empty() {
        env.insert(DEVICES_VAR.to_string(), device_list(&args.gpu));
    }

    let fingerprint = match args.fingerprint.clone().filter(|f| !f.is_empty()) {
        Some(fp) => Some(fp),
        None => fingerprint_for_files(&script_files, &cwd)?,
    };

    let tensorboard = args.tensorboard.then(|| TensorBoardRequest {
        host: args.tensorboard_host.clone(),
        port: args.tensorboard_port,
    });

    if args.no_link && !data_files.is_empty() {
        warn!(count = data_files.len(), "--no-link given; data files will not be linked");
    }

    Ok(ExecutionRequest {
        parent_id,
        name,
        description: args.description.clone(),
        tags,
        config,
        env,
        fingerprint,
        server,
        no_link: args.no_link,
        debug: args.debug,
        tensorboard,
        args: args.args.clone(),
        cwd,
        script_files: script_files.into_iter().collect(),
        data_files: data_files.into_iter().collect(),
    })
}

/// Split the arguments naming local files into script files and data files,
/// keeping first-seen order.
fn classify_files(args: &[String], cwd: &Path) -> (Vec<String>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut scripts = Vec::new();
    let mut data = Vec::new();
    for file in collect_relative_files(args, cwd) {
        if !seen.insert(file.clone()) {
            continue;
        }
        if is_script_file(&file, cwd) {
            scripts.push(file);
        } else {
            data.push(file);
        }
    }
    (scripts, data)
}
