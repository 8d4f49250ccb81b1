// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum MlrunError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source path not found: {0:?}")]
    SourceNotFound(PathBuf),

    #[error("Shared file system check failed: {0}")]
    ConsistencyCheck(String),

    #[error("JSON file content is not an object: {0:?}")]
    NotADocument(PathBuf),

    #[error("Invalid JSON in {path:?}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Program arguments are empty")]
    EmptyCommand,

    #[error("Auxiliary process did not report its url in {0} seconds")]
    AuxiliaryTimeout(u64),

    #[error("Auxiliary process exited before reporting its url")]
    AuxiliaryExited,

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MlrunError>;
