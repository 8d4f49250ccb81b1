#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use mlrun::request::{ExecutionRequest, TensorBoardRequest};
use serde_json::Value;

/// Builder for `ExecutionRequest` to simplify test setup.
pub struct ExecutionRequestBuilder {
    request: ExecutionRequest,
}

impl ExecutionRequestBuilder {
    /// A request named "test" that runs `args` from `cwd`.
    pub fn new(cwd: impl AsRef<Path>, args: &[&str]) -> Self {
        Self {
            request: ExecutionRequest {
                parent_id: None,
                name: "test".to_string(),
                description: None,
                tags: Vec::new(),
                config: BTreeMap::new(),
                env: BTreeMap::new(),
                fingerprint: None,
                server: "http://store.invalid".to_string(),
                no_link: false,
                debug: false,
                tensorboard: None,
                args: args.iter().map(|s| s.to_string()).collect(),
                cwd: PathBuf::from(cwd.as_ref()),
                script_files: BTreeSet::new(),
                data_files: BTreeSet::new(),
            },
        }
    }

    /// Shorthand for `sh -c <script>`.
    pub fn shell(cwd: impl AsRef<Path>, script: &str) -> Self {
        Self::new(cwd, &["sh", "-c", script])
    }

    pub fn name(mut self, name: &str) -> Self {
        self.request.name = name.to_string();
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.request.tags.push(tag.to_string());
        self
    }

    pub fn config(mut self, key: &str, value: Value) -> Self {
        self.request.config.insert(key.to_string(), value);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.request.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn script_file(mut self, path: &str) -> Self {
        self.request.script_files.insert(path.to_string());
        self
    }

    pub fn data_file(mut self, path: &str) -> Self {
        self.request.data_files.insert(path.to_string());
        self
    }

    pub fn no_link(mut self) -> Self {
        self.request.no_link = true;
        self
    }

    pub fn debug(mut self) -> Self {
        self.request.debug = true;
        self
    }

    pub fn parent(mut self, id: &str) -> Self {
        self.request.parent_id = Some(id.to_string());
        self
    }

    pub fn tensorboard(mut self, host: Option<&str>, port: u16) -> Self {
        self.request.tensorboard = Some(TensorBoardRequest {
            host: host.map(str::to_string),
            port,
        });
        self
    }

    pub fn build(self) -> ExecutionRequest {
        self.request
    }
}
