// src/exec/auxiliary.rs

//! Auxiliary dashboard process (TensorBoard) started next to the program.

use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::bytes::Regex;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::TensorBoardSettings;
use crate::errors::MlrunError;
use crate::exec::env::{UNBUFFERED_VAR, current_environment};
use crate::exec::process::spawn_output_reader;
use crate::host::reachable_host;
use crate::request::build::DEVICES_VAR;

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The line TensorBoard prints once it is serving. The trailing non-digit
/// keeps a port split across two reads from matching early.
static ANNOUNCEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TensorBoard \S+ at http://([^:]+):(\d+)\D").expect("valid announcement regex")
});

/// A running auxiliary process and the URL it announced.
///
/// Dropping the handle kills the process.
#[derive(Debug)]
pub struct AuxProcess {
    child: Child,
    url: String,
    scanner: JoinHandle<()>,
}

impl AuxProcess {
    /// Start the process on `logdir` and wait for its URL announcement.
    pub async fn launch(
        logdir: &Path,
        settings: &TensorBoardSettings,
        host: Option<&str>,
        port: u16,
    ) -> Result<Self> {
        let (program, leading) = settings
            .command
            .split_first()
            .ok_or_else(|| MlrunError::Config("empty tensorboard command".to_string()))?;
        let host = host.unwrap_or(DEFAULT_BIND_HOST);

        let mut env = current_environment();
        env.insert(UNBUFFERED_VAR.to_string(), "1".to_string());
        env.insert(DEVICES_VAR.to_string(), String::new());

        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg("--logdir")
            .arg(logdir)
            .arg("--host")
            .arg(host)
            .arg("--port")
            .arg(port.to_string())
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(program = %program, logdir = ?logdir, host, port, "starting auxiliary process");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning auxiliary process '{}'", program))?;

        let log = match &settings.log_file {
            Some(path) => {
                let path = logdir.join(path);
                Some(
                    File::create(&path)
                        .await
                        .with_context(|| format!("creating auxiliary log {:?}", path))?,
                )
            }
            None => None,
        };

        let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_output_reader(stdout, chunk_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_reader(stderr, chunk_tx);
        }

        let (url_tx, url_rx) = oneshot::channel();
        let scanner = tokio::spawn(scan_output(chunk_rx, url_tx, log));

        let url = match timeout(settings.timeout(), url_rx).await {
            Ok(Ok(url)) => url,
            Ok(Err(_)) => {
                let _ = child.kill().await;
                return Err(MlrunError::AuxiliaryExited.into());
            }
            Err(_) => {
                warn!(timeout_secs = settings.timeout_secs, "auxiliary process did not announce its url");
                let _ = child.kill().await;
                return Err(MlrunError::AuxiliaryTimeout(settings.timeout_secs).into());
            }
        };

        info!(%url, "auxiliary process is serving");
        Ok(Self { child, url, scanner })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Kill the process and give its output a moment to drain.
    pub async fn shutdown(mut self) {
        if let Err(err) = self.child.kill().await {
            debug!(error = %err, "auxiliary process already gone");
        }
        // Grandchildren may keep the pipes open after the process is gone.
        if timeout(DRAIN_TIMEOUT, &mut self.scanner).await.is_err() {
            debug!("auxiliary output still open; dropping the scanner");
            self.scanner.abort();
        }
    }
}

/// Look for the announcement in the head of the output and copy every chunk
/// to `log`. Scanning stops after the first match.
async fn scan_output(
    mut chunks: mpsc::Receiver<Vec<u8>>,
    url_tx: oneshot::Sender<String>,
    mut log: Option<File>,
) {
    let mut head = Vec::new();
    let mut url_tx = Some(url_tx);

    while let Some(chunk) = chunks.recv().await {
        if let Some(tx) = url_tx.take() {
            head.extend_from_slice(&chunk);
            match announced_url(&head) {
                Some(url) => {
                    let _ = tx.send(url);
                    head = Vec::new();
                }
                None => url_tx = Some(tx),
            }
        }

        if let Some(file) = log.as_mut() {
            let written = match file.write_all(&chunk).await {
                Ok(()) => file.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                warn!(error = %err, "auxiliary log write failed; no longer logging");
                log = None;
            }
        }
    }
    debug!("auxiliary output closed");
}

fn announced_url(head: &[u8]) -> Option<String> {
    let caps = ANNOUNCEMENT.captures(head)?;
    let host = String::from_utf8_lossy(&caps[1]);
    let port = String::from_utf8_lossy(&caps[2]);
    Some(format!("http://{}:{}", reachable_host(&host), port))
}
