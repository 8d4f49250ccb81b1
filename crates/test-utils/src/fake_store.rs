use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use mlrun::store::client::validate_relpath;
use mlrun::store::{
    Document, ExperimentRecord, ExperimentStatus, RemoteStore, StoreError, StoreFuture,
};
use serde_json::Value;
use tempfile::TempDir;

/// One call received by a [`FakeStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Create { name: String, fields: Document },
    Update { id: String, fields: Document },
    Heartbeat { id: String },
    GetFile { id: String, path: String },
    SetFinished { id: String, status: ExperimentStatus, fields: Document },
    Delete { id: String },
}

#[derive(Debug, Default)]
struct Faults {
    create: bool,
    corrupt_files: bool,
    /// Number of upcoming `set_finished` calls that fail.
    set_finished: usize,
    /// Number of `update` calls that succeed before every later one fails.
    updates_allowed: Option<usize>,
}

/// In-memory record store whose storage directories live in a temp dir.
///
/// A fake that:
/// - records every call in order
/// - merges updates into the stored record like the real server
/// - can be told to fail `create`, `get_file` or `update`, or the next few
///   `set_finished` calls.
pub struct FakeStore {
    root: TempDir,
    next_id: AtomicUsize,
    records: Mutex<BTreeMap<String, ExperimentRecord>>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<Faults>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("creating fake store root"),
            next_id: AtomicUsize::new(1),
            records: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Directory holding the storage directories of all records.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn fail_create(self) -> Self {
        self.faults.lock().unwrap().create = true;
        self
    }

    /// `get_file` returns content that differs from the file on disk.
    pub fn corrupt_files(self) -> Self {
        self.faults.lock().unwrap().corrupt_files = true;
        self
    }

    pub fn fail_set_finished(self, times: usize) -> Self {
        self.faults.lock().unwrap().set_finished = times;
        self
    }

    /// Let the first `allowed` updates through and fail the rest.
    pub fn fail_updates_after(self, allowed: usize) -> Self {
        self.faults.lock().unwrap().updates_allowed = Some(allowed);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn record(&self, id: &str) -> Option<ExperimentRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn storage_dir_of(&self, id: &str) -> PathBuf {
        self.root.path().join(id)
    }

    pub fn heartbeat_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Heartbeat { .. }))
            .count()
    }

    pub fn set_finished_calls(&self) -> Vec<(ExperimentStatus, Document)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::SetFinished { status, fields, .. } => Some((status, fields)),
                _ => None,
            })
            .collect()
    }

    /// Every value sent for `field` through `update`, in call order.
    pub fn updates_of(&self, field: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Update { mut fields, .. } => fields.remove(field),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn merge(&self, id: &str, fields: Document, status: Option<ExperimentStatus>) -> Result<ExperimentRecord, StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.fields.extend(fields);
        if status.is_some() {
            record.status = status;
        }
        Ok(record.clone())
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for FakeStore {
    fn create<'a>(&'a self, name: &'a str, fields: Document) -> StoreFuture<'a, ExperimentRecord> {
        Box::pin(async move {
            self.log(StoreCall::Create { name: name.to_string(), fields: fields.clone() });
            if self.faults.lock().unwrap().create {
                return Err(StoreError::Status { status: 500, body: "create refused".into() });
            }

            let id = format!("exp-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let mut fields = fields;
            fields.insert("name".into(), Value::String(name.to_string()));
            let record = ExperimentRecord {
                id: id.clone(),
                storage_dir: self.storage_dir_of(&id),
                status: Some(ExperimentStatus::Running),
                fields,
            };
            self.records.lock().unwrap().insert(id, record.clone());
            Ok(record)
        })
    }

    fn update<'a>(&'a self, id: &'a str, fields: Document) -> StoreFuture<'a, ExperimentRecord> {
        Box::pin(async move {
            self.log(StoreCall::Update { id: id.to_string(), fields: fields.clone() });
            {
                let mut faults = self.faults.lock().unwrap();
                match faults.updates_allowed {
                    Some(0) => {
                        return Err(StoreError::Status { status: 500, body: "update refused".into() });
                    }
                    Some(n) => faults.updates_allowed = Some(n - 1),
                    None => {}
                }
            }
            self.merge(id, fields, None)
        })
    }

    fn heartbeat<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.log(StoreCall::Heartbeat { id: id.to_string() });
            if self.records.lock().unwrap().contains_key(id) {
                Ok(())
            } else {
                Err(StoreError::NotFound(id.to_string()))
            }
        })
    }

    fn get_file<'a>(&'a self, id: &'a str, relative_path: &'a str) -> StoreFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.log(StoreCall::GetFile { id: id.to_string(), path: relative_path.to_string() });
            let relative_path = validate_relpath(relative_path)?;
            let dir = self
                .record(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?
                .storage_dir;
            let mut content = std::fs::read(dir.join(relative_path))
                .map_err(|e| StoreError::Other(format!("reading {relative_path}: {e}")))?;
            if self.faults.lock().unwrap().corrupt_files {
                content.extend_from_slice(b"-corrupted");
            }
            Ok(content)
        })
    }

    fn set_finished<'a>(
        &'a self,
        id: &'a str,
        status: ExperimentStatus,
        fields: Document,
    ) -> StoreFuture<'a, ExperimentRecord> {
        Box::pin(async move {
            self.log(StoreCall::SetFinished { id: id.to_string(), status, fields: fields.clone() });
            {
                let mut faults = self.faults.lock().unwrap();
                if faults.set_finished > 0 {
                    faults.set_finished -= 1;
                    return Err(StoreError::Status { status: 503, body: "try later".into() });
                }
            }
            self.merge(id, fields, Some(status))
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.log(StoreCall::Delete { id: id.to_string() });
            match self.records.lock().unwrap().remove(id) {
                Some(_) => Ok(vec![id.to_string()]),
                None => Err(StoreError::NotFound(id.to_string())),
            }
        })
    }
}
