// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `mlrun`.
///
/// The program to run goes after a `--` mark:
///
/// ```text
/// mlrun --name "Experiment 1" -- python train.py
/// ```
///
/// The program runs in the storage directory assigned by the server.
/// Script files named in the arguments are copied there, other existing
/// files and directories below the current directory are linked (unless
/// `--no-link`) and removed again when the run ends.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mlrun",
    version,
    about = "Run a program as a tracked experiment.",
    long_about = None
)]
pub struct CliArgs {
    /// Experiment name (default: the first script file).
    #[arg(short, long)]
    pub name: Option<String>,

    /// Experiment description.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Experiment tags, comma separated, e.g. "prec 0.996, state of the art".
    #[arg(short, long = "tags", value_name = "TAGS")]
    pub tags: Vec<String>,

    /// Configuration values, e.g. "max_epoch=1, normalizer=batch_norm".
    /// Overrides `--config-file`.
    #[arg(short, long = "config", value_name = "PAIRS")]
    pub config: Vec<String>,

    /// Load configuration values from a JSON file.
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    /// Environment variable (FOO=BAR). Overrides `--env-file`.
    #[arg(short, long = "env", value_name = "NAME=VALUE")]
    pub env: Vec<String>,

    /// Load environment variables from a file.
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<String>,

    /// Devices to expose through CUDA_VISIBLE_DEVICES.
    #[arg(long = "gpu", value_name = "IDS")]
    pub gpu: Vec<String>,

    /// Fingerprint of the experiment (default: computed from script files).
    #[arg(short, long)]
    pub fingerprint: Option<String>,

    /// URI of the record store, e.g. "http://localhost:8080".
    ///
    /// Falls back to the settings file, then `MLSTORAGE_SERVER_URI`.
    #[arg(short, long, value_name = "URI")]
    pub server: Option<String>,

    /// Do not link data files into the working directory.
    #[arg(long)]
    pub no_link: bool,

    /// Run TensorBoard in the program's working directory.
    #[arg(long)]
    pub tensorboard: bool,

    /// Host for TensorBoard to bind.
    #[arg(long, value_name = "HOST")]
    pub tensorboard_host: Option<String>,

    /// Port for TensorBoard to bind (0 picks a free port).
    #[arg(long, value_name = "PORT", default_value_t = 0)]
    pub tensorboard_port: u16,

    /// Debug the program instead of running it formally; the experiment is
    /// deleted after it finishes.
    #[arg(long)]
    pub debug: bool,

    /// Runner settings file (TOML). Default: `mlrun.toml` if present.
    #[arg(long, value_name = "PATH")]
    pub settings: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MLRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Program arguments.
    #[arg(last = true, required = true, value_name = "PROGRAM")]
    pub args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
