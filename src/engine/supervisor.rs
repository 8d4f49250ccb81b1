// src/engine/supervisor.rs

//! One experiment run, from record creation to the terminal status.
//!
//! ```text
//! create record ─► probe shared storage ─► publish exec_info ─► prepare run dir
//!      │                                                              │
//!      │   ┌───────────────── program scope ────────────────────────┐ │
//!      │   │ aux process ─► jobs ─► console ─► program ─► wait      │◄┘
//!      │   │ (torn down in reverse on every path)                   │
//!      │   └────────────────────────────────────────────────────────┘
//!      │                              │
//!      │          forced collection ─► cleanup ─► COMPLETED
//!      │                              │ (any error on the way)
//!      │                              └─► FAILED
//!      └─► cleanup ─► delete record (debug only)
//! ```
//!
//! A failure to create the record is returned as an error. Every failure
//! after that is reported to the store as a FAILED record and the run
//! returns normally; only a failure to report it is returned as an error.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunnerSettings;
use crate::engine::retry::retry;
use crate::errors::MlrunError;
use crate::exec::{
    AuxProcess, CONSOLE_LOG_FILE, ChildProgram, ConsoleDuplicator, ForcedEnvironment,
    current_environment, derive_child_environment, exit_code,
};
use crate::fs::{CleanupSet, clone_file_or_dir, compute_fs_size};
use crate::host::hostname;
use crate::jobs::{
    BackgroundJob, CONFIG_FILE, DEFAULT_CONFIG_FILE, HeartbeatJob, JobTask, JsonCollectorJob,
    RESULT_FILE, WEBUI_FILE, WebUiLink,
};
use crate::request::ExecutionRequest;
use crate::store::{Document, ExperimentRecord, ExperimentStatus, RemoteStore, SharedRecord};

/// Record field holding launch details.
pub const EXEC_INFO_FIELD: &str = "exec_info";

/// How a run ended, once its record has reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub experiment_id: String,
    pub status: ExperimentStatus,
    /// Set once the program has exited.
    pub exit_code: Option<i32>,
}

impl RunOutcome {
    /// Exit code for the `mlrun` process itself.
    pub fn process_exit_code(&self) -> i32 {
        match (self.status, self.exit_code) {
            (ExperimentStatus::Completed, Some(code)) => code,
            (ExperimentStatus::Completed, None) => 0,
            _ => 1,
        }
    }
}

/// Runs experiments against one record store.
pub struct Supervisor {
    store: Arc<dyn RemoteStore>,
    settings: RunnerSettings,
}

impl Supervisor {
    pub fn new(store: Arc<dyn RemoteStore>, settings: RunnerSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Run `request` to completion.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<RunOutcome> {
        if let Some(parent) = &request.parent_id {
            info!(parent_id = %parent, "launched within a parent experiment");
        }
        debug!(env = ?request.env, config = ?request.config, "execution request");

        let created = self
            .store
            .create(&request.name, creation_document(request))
            .await
            .context("creating experiment record")?;
        info!(
            experiment_id = %created.id,
            storage_dir = ?created.storage_dir,
            "experiment created"
        );

        let mut run = Run {
            supervisor: self,
            request,
            record: Arc::new(SharedRecord::new(created)),
            cleanup: CleanupSet::new(),
            started: false,
            exit_code: None,
            completed: false,
        };

        let outcome = run.execute_and_report().await;

        let leftovers = run.cleanup.drain();
        if !leftovers.is_empty() {
            warn!(paths = ?leftovers, "some linked paths could not be removed");
        }

        if request.debug {
            let id = run.record.id();
            let deleted = retry(
                "delete debugging experiment",
                &self.settings.retry_backoff(),
                async || self.store.delete(id).await,
            )
            .await;
            match deleted {
                Ok(ids) => debug!(deleted = ?ids, "debugging experiment deleted"),
                Err(err) => match &outcome {
                    Ok(o) if o.status == ExperimentStatus::Completed => {
                        return Err(err).context("deleting debugging experiment");
                    }
                    _ => warn!(error = %err, "failed to delete debugging experiment"),
                },
            }
        }

        outcome
    }
}

/// Fields sent with the create call.
pub fn creation_document(request: &ExecutionRequest) -> Document {
    let mut doc = Document::new();
    doc.insert("args".into(), json!(request.args));
    doc.insert(EXEC_INFO_FIELD.into(), json!({ "hostname": hostname() }));
    if let Some(parent) = &request.parent_id {
        doc.insert("parent_id".into(), json!(parent));
    }
    if let Some(description) = request.description.as_ref().filter(|d| !d.is_empty()) {
        doc.insert("description".into(), json!(description));
    }
    if !request.tags.is_empty() {
        doc.insert("tags".into(), json!(request.tags));
    }
    if let Some(fingerprint) = &request.fingerprint {
        doc.insert("fingerprint".into(), json!(fingerprint));
    }
    if !request.config.is_empty() {
        doc.insert("config".into(), json!(request.config));
    }
    doc
}

/// State of one run after its record exists.
struct Run<'a> {
    supervisor: &'a Supervisor,
    request: &'a ExecutionRequest,
    record: Arc<SharedRecord>,
    cleanup: CleanupSet,
    /// The program process was spawned.
    started: bool,
    exit_code: Option<i32>,
    /// The record reached COMPLETED.
    completed: bool,
}

impl Run<'_> {
    fn store(&self) -> &dyn RemoteStore {
        self.supervisor.store.as_ref()
    }

    fn settings(&self) -> &RunnerSettings {
        &self.supervisor.settings
    }

    fn outcome(&self, status: ExperimentStatus) -> RunOutcome {
        RunOutcome {
            experiment_id: self.record.id().to_string(),
            status,
            exit_code: self.exit_code,
        }
    }

    async fn execute_and_report(&mut self) -> Result<RunOutcome> {
        match self.execute().await {
            Ok(()) => Ok(self.outcome(ExperimentStatus::Completed)),
            Err(err) if self.completed => {
                warn!(error = ?err, "error after the experiment was marked completed");
                Ok(self.outcome(ExperimentStatus::Completed))
            }
            Err(err) => {
                error!(
                    experiment_id = %self.record.id(),
                    error = ?err,
                    "failed to run the experiment"
                );
                self.report_failure(&err).await?;
                Ok(self.outcome(ExperimentStatus::Failed))
            }
        }
    }

    /// Everything up to and including the COMPLETED transition.
    async fn execute(&mut self) -> Result<()> {
        self.check_shared_storage().await?;
        let env = self.publish_exec_info().await?;
        self.prepare_workspace()?;

        let webui = Arc::new(WebUiLink::default());
        let mut collectors = self.collector_jobs(&webui);

        let scoped = self.run_program(&env, &webui, &mut collectors).await;
        let finished = self.finish(&mut collectors).await;
        scoped.and(finished)
    }

    /// Check that the store sees the same run directory we do.
    async fn check_shared_storage(&self) -> Result<()> {
        let dir = self.record.storage_dir();
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating run directory {:?}", dir))?;

        let probe_name = format!("{}.txt", Uuid::new_v4());
        let probe_path = dir.join(&probe_name);
        let content = Uuid::new_v4().to_string().into_bytes();
        tokio::fs::write(&probe_path, &content)
            .await
            .with_context(|| format!("writing probe file {:?}", probe_path))?;

        let remote = self
            .store()
            .get_file(self.record.id(), &probe_name)
            .await
            .map_err(|err| {
                MlrunError::ConsistencyCheck(format!("cannot read probe file through the store: {err}"))
            })?;
        if remote != content {
            return Err(MlrunError::ConsistencyCheck(
                "probe file content read through the store does not match".to_string(),
            )
            .into());
        }

        tokio::fs::remove_file(&probe_path)
            .await
            .with_context(|| format!("removing probe file {:?}", probe_path))?;
        debug!("shared storage check passed");
        Ok(())
    }

    /// Compute the program environment and record it with the work dir.
    async fn publish_exec_info(&self) -> Result<BTreeMap<String, String>> {
        let forced = ForcedEnvironment {
            server: &self.request.server,
            experiment_id: self.record.id(),
            work_dir: self.record.storage_dir(),
        };
        let env = derive_child_environment(current_environment(), &self.request.env, &forced);

        let mut exec_info = self.record.object_field(EXEC_INFO_FIELD);
        exec_info.insert(
            "work_dir".into(),
            json!(self.record.storage_dir().to_string_lossy()),
        );
        exec_info.insert("env".into(), json!(env));
        self.update_exec_info(exec_info)
            .await
            .context("publishing exec_info")?;
        Ok(env)
    }

    async fn update_exec_info(&self, exec_info: Document) -> Result<()> {
        let mut fields = Document::new();
        fields.insert(EXEC_INFO_FIELD.into(), Value::Object(exec_info));
        let updated: ExperimentRecord = self.store().update(self.record.id(), fields).await?;
        self.record.replace(updated);
        Ok(())
    }

    /// Copy scripts, link data files and write `config.json`.
    fn prepare_workspace(&mut self) -> Result<()> {
        let dir = self.record.storage_dir().to_path_buf();
        let request = self.request;

        for script in &request.script_files {
            clone_file_or_dir(&request.cwd.join(script), Path::new(script), &dir, false)?;
        }
        for data in request.linked_data_files() {
            self.cleanup.add(dir.join(data));
            clone_file_or_dir(&request.cwd.join(data), Path::new(data), &dir, true)?;
        }

        if !request.config.is_empty() {
            let path = dir.join(CONFIG_FILE);
            let text = serde_json::to_string_pretty(&request.config)?;
            std::fs::write(&path, text).with_context(|| format!("writing {:?}", path))?;
        }
        debug!(
            scripts = request.script_files.len(),
            linked = self.cleanup.len(),
            "run directory prepared"
        );
        Ok(())
    }

    fn collector_jobs(&self, webui: &Arc<WebUiLink>) -> Vec<BackgroundJob<JsonCollectorJob>> {
        let store = &self.supervisor.store;
        let interval = self.settings().collect_interval();
        let job = |filename: &str, field: &str| {
            JsonCollectorJob::new(store.clone(), self.record.clone(), filename, field)
        };
        vec![
            BackgroundJob::new(job(WEBUI_FILE, "webui").with_hook(webui.clone()), interval),
            BackgroundJob::new(job(DEFAULT_CONFIG_FILE, "default_config"), interval),
            BackgroundJob::new(job(RESULT_FILE, "result"), interval),
        ]
    }

    /// The program scope. Collector jobs are moved into their loops and put
    /// back into `collectors` once stopped.
    async fn run_program(
        &mut self,
        env: &BTreeMap<String, String>,
        webui: &WebUiLink,
        collectors: &mut Vec<BackgroundJob<JsonCollectorJob>>,
    ) -> Result<()> {
        let aux = match &self.request.tensorboard {
            Some(tb) => Some(self.start_auxiliary(tb.host.as_deref(), tb.port, webui).await?),
            None => None,
        };

        let heartbeat = BackgroundJob::new(
            HeartbeatJob::new(self.supervisor.store.clone(), self.record.clone()),
            self.settings().heartbeat_interval(),
        )
        .run_in_background();
        let running: Vec<_> = collectors
            .drain(..)
            .map(BackgroundJob::run_in_background)
            .collect();

        let waited = self.spawn_and_wait(env).await;

        let mut teardown: Result<()> = Ok(());
        for job in running.into_iter().rev() {
            match job.stop().await {
                Ok(job) => collectors.push(job),
                Err(err) => {
                    warn!(error = ?err, "background job did not stop cleanly");
                    teardown = teardown.and(Err(err));
                }
            }
        }
        collectors.reverse();
        if let Err(err) = heartbeat.stop().await {
            warn!(error = ?err, "heartbeat job did not stop cleanly");
            teardown = teardown.and(Err(err));
        }

        webui.set_uri(None);
        if let Some(aux) = aux {
            aux.shutdown().await;
            info!("TensorBoard exited");
        }

        waited.and(teardown)
    }

    async fn start_auxiliary(
        &self,
        host: Option<&str>,
        port: u16,
        webui: &WebUiLink,
    ) -> Result<AuxProcess> {
        let aux = AuxProcess::launch(
            self.record.storage_dir(),
            &self.settings().tensorboard,
            host,
            port,
        )
        .await
        .context("launching TensorBoard")?;

        let mut link = Document::new();
        link.insert(webui.key().to_string(), json!(aux.url()));
        let mut fields = Document::new();
        fields.insert("webui".into(), Value::Object(link));
        let updated = self
            .store()
            .update(self.record.id(), fields)
            .await
            .context("publishing TensorBoard url")?;
        self.record.replace(updated);

        webui.set_uri(Some(aux.url().to_string()));
        info!(url = %aux.url(), "TensorBoard launched");
        Ok(aux)
    }

    async fn spawn_and_wait(&mut self, env: &BTreeMap<String, String>) -> Result<()> {
        let dir = self.record.storage_dir();
        let mut console = ConsoleDuplicator::open(dir, CONSOLE_LOG_FILE)?;
        let child = ChildProgram::spawn(&self.request.args, dir, env)?;
        self.started = true;

        if let Some(pid) = child.id() {
            let mut exec_info = self.record.object_field(EXEC_INFO_FIELD);
            exec_info.insert("pid".into(), json!(pid));
            if let Err(err) = self.update_exec_info(exec_info).await {
                warn!(pid, error = ?err, "failed to publish program pid");
            }
        }

        let status = child.wait_with_console(&mut console).await?;
        console.close();
        let code = exit_code(&status);
        self.exit_code = Some(code);
        debug!(exit_code = code, "program exited");
        Ok(())
    }

    /// Forced collection, cleanup and the COMPLETED transition.
    async fn finish(&mut self, collectors: &mut [BackgroundJob<JsonCollectorJob>]) -> Result<()> {
        let backoff = self.settings().retry_backoff();

        for job in collectors.iter_mut() {
            let label = job.task().name().to_string();
            retry(&label, &backoff, async || job.task_mut().collect(true).await).await?;
        }
        debug!("JSON documents collected");

        self.cleanup.drain();
        debug!("run directory cleanup finished");

        if !self.started {
            return Ok(());
        }

        let storage_size = compute_fs_size(self.record.storage_dir())?;
        let mut fields = Document::new();
        fields.insert("exit_code".into(), json!(self.exit_code));
        fields.insert("storage_size".into(), json!(storage_size));

        let id = self.record.id();
        let store = self.store();
        let finished = retry("store the experiment result", &backoff, async || {
            store
                .set_finished(id, ExperimentStatus::Completed, fields.clone())
                .await
        })
        .await?;
        self.record.replace(finished);
        self.completed = true;

        info!(exit_code = ?self.exit_code, storage_size, "experiment completed");
        Ok(())
    }

    async fn report_failure(&self, err: &anyhow::Error) -> Result<()> {
        let mut fields = Document::new();
        fields.insert(
            "error".into(),
            json!({
                "message": format!("{err:#}"),
                "traceback": format!("{err:?}"),
            }),
        );

        let id = self.record.id();
        let store = self.store();
        let finished = retry(
            "store the experiment failure",
            &self.settings().retry_backoff(),
            async || {
                store
                    .set_finished(id, ExperimentStatus::Failed, fields.clone())
                    .await
            },
        )
        .await?;
        self.record.replace(finished);
        Ok(())
    }
}
