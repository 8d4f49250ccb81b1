// src/request/mod.rs

//! The immutable description of one experiment run.
//!
//! An [`ExecutionRequest`] is assembled once by the command-line layer
//! ([`build`]) and only read afterwards. [`parse`] holds the small text
//! formats used on the command line (tags, `key=value` configs, env files).

pub mod build;
pub mod parse;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde_json::Value;

pub use build::build_request;

/// Where to bind the auxiliary dashboard process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorBoardRequest {
    pub host: Option<String>,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Id of the enclosing experiment, when launched from within one.
    pub parent_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Ordered, without duplicates.
    pub tags: Vec<String>,
    pub config: BTreeMap<String, Value>,
    /// User overrides applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub fingerprint: Option<String>,
    pub server: String,
    pub no_link: bool,
    pub debug: bool,
    pub tensorboard: Option<TensorBoardRequest>,
    /// Program and its arguments.
    pub args: Vec<String>,
    /// Directory the script and data files are relative to.
    pub cwd: PathBuf,
    pub script_files: BTreeSet<String>,
    /// Never overlaps with `script_files`.
    pub data_files: BTreeSet<String>,
}

impl ExecutionRequest {
    /// Data files that will be linked into the run directory.
    pub fn linked_data_files(&self) -> impl Iterator<Item = &String> {
        self.data_files
            .iter()
            .filter(move |f| !self.no_link && !self.script_files.contains(*f))
    }
}
