// src/exec/process.rs

//! The supervised program process.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::MlrunError;
use crate::exec::console::ConsoleDuplicator;

const READ_CHUNK: usize = 8 * 1024;

/// A running program whose stdout and stderr are merged into one stream of
/// chunks.
///
/// The process is killed if the handle is dropped before it exits.
#[derive(Debug)]
pub struct ChildProgram {
    program: String,
    child: Child,
    output_rx: mpsc::Receiver<Vec<u8>>,
    readers: Vec<JoinHandle<()>>,
}

impl ChildProgram {
    /// Start `args[0]` with the remaining arguments in `cwd`, with exactly
    /// the variables in `env`.
    pub fn spawn(args: &[String], cwd: &Path, env: &BTreeMap<String, String>) -> Result<Self> {
        let (program, rest) = args.split_first().ok_or(MlrunError::EmptyCommand)?;

        info!(program = %program, cwd = ?cwd, "starting program");

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .current_dir(cwd)
            .env_clear()
            .envs(env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning program '{}'", program))?;

        let (tx, output_rx) = mpsc::channel::<Vec<u8>>(64);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_output_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_output_reader(stderr, tx));
        }

        Ok(Self {
            program: program.clone(),
            child,
            output_rx,
            readers,
        })
    }

    /// OS process id, while the process is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Feed all output to `console` until the process has exited and both
    /// of its output streams are closed.
    pub async fn wait_with_console<W: Write>(
        mut self,
        console: &mut ConsoleDuplicator<W>,
    ) -> Result<ExitStatus> {
        let mut status: Option<ExitStatus> = None;
        let mut output_open = true;
        let mut write_failed = false;

        while status.is_none() || output_open {
            tokio::select! {
                res = self.child.wait(), if status.is_none() => {
                    let st = res.with_context(|| format!("waiting for program '{}'", self.program))?;
                    debug!(program = %self.program, ?st, "program exited; draining output");
                    status = Some(st);
                }
                chunk = self.output_rx.recv(), if output_open => match chunk {
                    Some(chunk) => {
                        if let Err(err) = console.on_output(&chunk) {
                            if !write_failed {
                                warn!(error = %err, "failed to duplicate program output");
                                write_failed = true;
                            }
                        }
                    }
                    None => output_open = false,
                },
            }
        }

        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }

        // Both branches above only leave the loop once `status` is set.
        status.ok_or_else(|| anyhow::anyhow!("program '{}' has no exit status", self.program))
    }
}

/// Exit code of a finished process; a signal-terminated process reports the
/// negated signal number.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

pub(crate) fn spawn_output_reader<R>(mut stream: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "output stream closed with error");
                    break;
                }
            }
        }
    })
}
