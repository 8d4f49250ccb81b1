// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod host;
pub mod jobs;
pub mod logging;
pub mod request;
pub mod store;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_settings;
use crate::engine::Supervisor;
use crate::exec::current_environment;
use crate::request::build_request;
use crate::store::ApiClient;

/// High-level entry point used by `main.rs`.
///
/// Loads the runner settings, turns the arguments into an execution request
/// and supervises one run against the HTTP record store. Returns the exit
/// code for the `mlrun` process.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let settings = load_settings(args.settings.as_deref().map(Path::new), &cwd)?;
    let request = build_request(&args, &settings, cwd, &current_environment())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %request.name,
        server = %request.server,
        "mlrun starting"
    );
    if request.debug {
        debug!("debug run: the experiment will be deleted afterwards");
    }

    let store = ApiClient::with_timeout(&request.server, settings.http_timeout())?;
    let supervisor = Supervisor::new(Arc::new(store), settings);
    let outcome = supervisor.run(&request).await?;

    info!(
        experiment_id = %outcome.experiment_id,
        status = %outcome.status,
        exit_code = ?outcome.exit_code,
        "experiment finished"
    );
    Ok(outcome.process_exit_code())
}
