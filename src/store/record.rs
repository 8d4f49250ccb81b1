// src/store/record.rs

//! Locally cached copy of the experiment record.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::{Document, ExperimentRecord};

/// The experiment record shared between the supervisor and its background
/// jobs.
///
/// `id` and `storage_dir` never change after creation and can be read
/// without locking. The cached document is replaced wholesale after every
/// successful update issued by the supervisor, while each collector job only
/// writes its own field.
#[derive(Debug)]
pub struct SharedRecord {
    id: String,
    storage_dir: PathBuf,
    cached: Mutex<ExperimentRecord>,
}

impl SharedRecord {
    pub fn new(record: ExperimentRecord) -> Self {
        Self {
            id: record.id.clone(),
            storage_dir: record.storage_dir.clone(),
            cached: Mutex::new(record),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Replace the cached record with the one returned by the store.
    pub fn replace(&self, record: ExperimentRecord) {
        *self.lock() = record;
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.lock().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.lock().fields.insert(name.to_string(), value);
    }

    /// The object stored under `name`, or an empty one if the field is
    /// missing or not an object.
    pub fn object_field(&self, name: &str) -> Document {
        match self.field(name) {
            Some(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExperimentRecord> {
        // Writers never leave a partially updated record behind.
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }
}
