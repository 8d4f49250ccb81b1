// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Runner settings as read from a TOML file.
///
/// ```toml
/// server = "http://localhost:8080"
/// heartbeat_interval_secs = 120
/// collect_interval_secs = 10
/// retry_backoff_secs = [10, 30, 60, 120, 300]
///
/// [tensorboard]
/// command = ["tensorboard"]
/// timeout_secs = 30
/// ```
///
/// All keys are optional and have the defaults shown above.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Record store URI; the `--server` flag wins over this.
    pub server: Option<String>,

    /// Seconds between two heartbeats.
    pub heartbeat_interval_secs: u64,

    /// Seconds between two passes of each JSON collector.
    pub collect_interval_secs: u64,

    /// Waits between retries of a failing remote call. The call is attempted
    /// once more after the last wait.
    pub retry_backoff_secs: Vec<u64>,

    /// Timeout of a single HTTP request to the store.
    pub http_timeout_secs: u64,

    pub tensorboard: TensorBoardSettings,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            server: None,
            heartbeat_interval_secs: 120,
            collect_interval_secs: 10,
            retry_backoff_secs: vec![10, 30, 60, 120, 300],
            http_timeout_secs: 60,
            tensorboard: TensorBoardSettings::default(),
        }
    }
}

impl RunnerSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn retry_backoff(&self) -> Vec<Duration> {
        self.retry_backoff_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// `[tensorboard]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TensorBoardSettings {
    /// Program (and leading arguments) to launch. `--logdir`, `--host` and
    /// `--port` are appended.
    pub command: Vec<String>,

    /// Seconds to wait for the process to announce its URL.
    pub timeout_secs: u64,

    /// Where to copy the process output, relative to the run directory.
    pub log_file: Option<PathBuf>,
}

impl Default for TensorBoardSettings {
    fn default() -> Self {
        Self {
            command: vec!["tensorboard".to_string()],
            timeout_secs: 30,
            log_file: None,
        }
    }
}

impl TensorBoardSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
