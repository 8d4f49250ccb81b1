// src/jobs/heartbeat.rs

use std::sync::Arc;

use tracing::trace;

use crate::jobs::{JobFuture, JobTask};
use crate::store::{RemoteStore, SharedRecord};

/// Keeps the record's liveness timestamp fresh.
pub struct HeartbeatJob {
    store: Arc<dyn RemoteStore>,
    record: Arc<SharedRecord>,
}

impl HeartbeatJob {
    pub fn new(store: Arc<dyn RemoteStore>, record: Arc<SharedRecord>) -> Self {
        Self { store, record }
    }
}

impl JobTask for HeartbeatJob {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn run_once(&mut self) -> JobFuture<'_> {
        Box::pin(async move {
            trace!(id = %self.record.id(), "sending heartbeat");
            self.store.heartbeat(self.record.id()).await?;
            Ok(())
        })
    }
}
