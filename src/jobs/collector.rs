// src/jobs/collector.rs

//! Publishing JSON documents the program writes into its run directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::MlrunError;
use crate::jobs::{JobFuture, JobTask};
use crate::store::{Document, RemoteStore, SharedRecord};

/// Configuration written by the supervisor before the program starts.
pub const CONFIG_FILE: &str = "config.json";
/// Defaults the program reports for its configuration.
pub const DEFAULT_CONFIG_FILE: &str = "config.defaults.json";
pub const RESULT_FILE: &str = "result.json";
/// Links to web dashboards serving this run.
pub const WEBUI_FILE: &str = "webui.json";

/// Rewrites a collected document before it is published.
pub trait DocumentHook: Send + Sync {
    fn apply(&self, doc: Document) -> Document;
}

/// Keeps the auxiliary dashboard URL in the `webui` document while the
/// dashboard is running.
#[derive(Debug)]
pub struct WebUiLink {
    key: String,
    uri: RwLock<Option<String>>,
}

impl Default for WebUiLink {
    fn default() -> Self {
        Self::new("TensorBoard")
    }
}

impl WebUiLink {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            uri: RwLock::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_uri(&self, uri: Option<String>) {
        *self.uri.write().unwrap_or_else(|e| e.into_inner()) = uri;
    }

    pub fn uri(&self) -> Option<String> {
        self.uri.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DocumentHook for WebUiLink {
    fn apply(&self, mut doc: Document) -> Document {
        match self.uri() {
            Some(uri) => {
                doc.insert(self.key.clone(), Value::String(uri));
            }
            None => {
                doc.remove(&self.key);
            }
        }
        doc
    }
}

/// Modification time and size of the file at the last successful pass.
type Watermark = (Option<SystemTime>, u64);

/// Publishes the JSON object in `storage_dir/filename` as record field
/// `field` whenever the file changes.
///
/// A missing file is not an error. A file that is not a JSON object is
/// logged and skipped, and the watermark stays put so the next write is
/// picked up.
pub struct JsonCollectorJob {
    name: String,
    store: Arc<dyn RemoteStore>,
    record: Arc<SharedRecord>,
    filename: String,
    field: String,
    hook: Option<Arc<dyn DocumentHook>>,
    watermark: Option<Watermark>,
}

impl JsonCollectorJob {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        record: Arc<SharedRecord>,
        filename: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        let field = field.into();
        Self {
            name: format!("collect {field}"),
            store,
            record,
            filename: filename.into(),
            field,
            hook: None,
            watermark: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn DocumentHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn path(&self) -> PathBuf {
        self.record.storage_dir().join(&self.filename)
    }

    /// One pass. With `force`, the document is published even if the file
    /// looks unchanged.
    pub async fn collect(&mut self, force: bool) -> Result<()> {
        let path = self.path();
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err).with_context(|| format!("stat {:?}", path)),
        };
        if !meta.is_file() {
            return Ok(());
        }

        let seen: Watermark = (meta.modified().ok(), meta.len());
        if !force && self.watermark == Some(seen) {
            return Ok(());
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err).with_context(|| format!("reading {:?}", path)),
        };
        let mut doc = match parse_document(&path, &bytes) {
            Ok(doc) => doc,
            Err(err) => {
                warn!(field = %self.field, error = %err, "skipping malformed document");
                return Ok(());
            }
        };

        if let Some(hook) = &self.hook {
            doc = hook.apply(doc);
        }

        let mut update = Document::new();
        update.insert(self.field.clone(), Value::Object(doc.clone()));
        self.store
            .update(self.record.id(), update)
            .await
            .with_context(|| format!("publishing {}", self.field))?;
        self.record.set_field(&self.field, Value::Object(doc));

        if self.watermark.is_none() {
            info!(field = %self.field, file = %self.filename, "collected document");
        } else {
            debug!(field = %self.field, file = %self.filename, "collected document");
        }
        self.watermark = Some(seen);
        Ok(())
    }
}

fn parse_document(path: &Path, bytes: &[u8]) -> std::result::Result<Document, MlrunError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| MlrunError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(doc) => Ok(doc),
        _ => Err(MlrunError::NotADocument(path.to_path_buf())),
    }
}

impl JobTask for JsonCollectorJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_once(&mut self) -> JobFuture<'_> {
        Box::pin(self.collect(false))
    }
}
