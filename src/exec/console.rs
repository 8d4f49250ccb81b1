// src/exec/console.rs

//! Tee the program's console output into `console.log` and our own stdout.

use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Name of the console log inside the run directory.
pub const CONSOLE_LOG_FILE: &str = "console.log";

/// Writes every chunk of child output to a log file and to a mirror stream
/// (our stdout in production), in that order, flushing the mirror after
/// each chunk.
///
/// The log file is closed when the duplicator is dropped; the mirror is
/// only flushed, never closed.
#[derive(Debug)]
pub struct ConsoleDuplicator<W: Write = Stdout> {
    path: PathBuf,
    log: Option<File>,
    mirror: W,
}

impl ConsoleDuplicator<Stdout> {
    /// Open `dir/file_name` for writing, truncating any previous content,
    /// with our stdout as the mirror.
    pub fn open(dir: &Path, file_name: &str) -> Result<Self> {
        // Anything still buffered in our own streams must not end up
        // interleaved with the child's output.
        io::stdout().flush().context("flushing stdout")?;
        io::stderr().flush().context("flushing stderr")?;
        Self::with_mirror(dir.join(file_name), io::stdout())
    }
}

impl<W: Write> ConsoleDuplicator<W> {
    pub fn with_mirror(path: PathBuf, mirror: W) -> Result<Self> {
        let log = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("opening console log {:?}", path))?;
        Ok(Self {
            path,
            log: Some(log),
            mirror,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle one chunk of child output.
    pub fn on_output(&mut self, buf: &[u8]) -> io::Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.write_all(buf)?;
        }
        self.mirror.write_all(buf)?;
        self.mirror.flush()
    }

    /// Close the log file. Further output only reaches the mirror.
    pub fn close(&mut self) {
        self.log = None;
    }

    pub fn into_mirror(mut self) -> W {
        self.close();
        self.mirror
    }
}
