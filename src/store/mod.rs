// src/store/mod.rs

//! Remote record store abstraction.
//!
//! The supervisor never talks HTTP directly; it goes through a
//! [`RemoteStore`]. Production code uses [`ApiClient`], tests plug in an
//! in-memory fake.
//!
//! - [`client`] is the HTTP binding of the store API (v1).
//! - [`record`] holds the locally cached copy of the experiment record that
//!   the supervisor and the background jobs share.

pub mod client;
pub mod record;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use client::ApiClient;
pub use record::SharedRecord;

/// An open JSON document (object) as stored in the remote record.
pub type Document = Map<String, Value>;

/// Boxed future returned by every [`RemoteStore`] call.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Lifecycle status of an experiment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExperimentStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExperimentStatus::Running => "RUNNING",
            ExperimentStatus::Completed => "COMPLETED",
            ExperimentStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// The experiment record as returned by the store.
///
/// `id` and `storage_dir` are assigned by the server; every other field of
/// the document (`config`, `result`, `webui`, `exec_info`, ...) lives in
/// `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub id: String,
    pub storage_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExperimentStatus>,
    #[serde(flatten)]
    pub fields: Document,
}

impl ExperimentRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid relative path: {0:?}")]
    InvalidPath(String),

    #[error("experiment not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Request/response view of the remote record store.
///
/// Implementations must be shareable between the supervisor and the
/// background jobs, hence `Send + Sync`.
pub trait RemoteStore: Send + Sync {
    /// Create a new record. Not idempotent.
    fn create<'a>(&'a self, name: &'a str, fields: Document) -> StoreFuture<'a, ExperimentRecord>;

    /// Merge `fields` into the record and return the updated record.
    fn update<'a>(&'a self, id: &'a str, fields: Document) -> StoreFuture<'a, ExperimentRecord>;

    /// Refresh the liveness timestamp of the record.
    fn heartbeat<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    /// Read a file below the record's storage directory through the store.
    fn get_file<'a>(&'a self, id: &'a str, relative_path: &'a str) -> StoreFuture<'a, Vec<u8>>;

    /// Terminal transition to COMPLETED or FAILED.
    fn set_finished<'a>(
        &'a self,
        id: &'a str,
        status: ExperimentStatus,
        fields: Document,
    ) -> StoreFuture<'a, ExperimentRecord>;

    /// Delete the record; returns the ids of all affected records.
    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_keeps_unknown_fields() {
        let record: ExperimentRecord = serde_json::from_value(json!({
            "id": "abc",
            "storage_dir": "/tmp/abc",
            "status": "RUNNING",
            "result": {"accuracy": 0.5},
        }))
        .unwrap();

        assert_eq!(record.id, "abc");
        assert_eq!(record.status, Some(ExperimentStatus::Running));
        assert_eq!(record.field("result"), Some(&json!({"accuracy": 0.5})));
        assert!(record.field("id").is_none());
    }

    #[test]
    fn status_display_matches_wire_format() {
        assert_eq!(ExperimentStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(
            serde_json::to_value(ExperimentStatus::Failed).unwrap(),
            json!("FAILED")
        );
    }
}
