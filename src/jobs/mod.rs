// src/jobs/mod.rs

//! Periodic background work that runs next to the supervised program.
//!
//! A [`JobTask`] knows how to do one pass of work. [`BackgroundJob`] pairs
//! it with an interval and runs it on a tokio task until stopped:
//!
//! ```text
//! BackgroundJob --run_in_background--> RunningJob --stop().await--> BackgroundJob
//! ```
//!
//! `stop` interrupts the interval wait, so it returns as soon as any pass in
//! flight has finished. The job comes back out of `stop` so the caller can
//! run one more pass by hand.

pub mod collector;
pub mod heartbeat;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

pub use collector::{
    CONFIG_FILE, DEFAULT_CONFIG_FILE, DocumentHook, JsonCollectorJob, RESULT_FILE, WEBUI_FILE,
    WebUiLink,
};
pub use heartbeat::HeartbeatJob;

pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// One unit of periodic work.
pub trait JobTask: Send + 'static {
    fn name(&self) -> &str;

    /// A single pass. Errors are logged by the runner and never stop the
    /// loop.
    fn run_once(&mut self) -> JobFuture<'_>;
}

/// A job that is not running.
#[derive(Debug)]
pub struct BackgroundJob<T> {
    task: T,
    interval: Duration,
}

impl<T: JobTask> BackgroundJob<T> {
    pub fn new(task: T, interval: Duration) -> Self {
        Self { task, interval }
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut T {
        &mut self.task
    }

    /// Start the loop: one pass, then wait `interval`, until stopped.
    pub fn run_in_background(self) -> RunningJob<T> {
        let (stop_tx, stop_rx) = oneshot::channel();
        let name = self.task.name().to_string();
        let interval = self.interval;
        debug!(job = %name, ?interval, "starting background job");
        let handle = tokio::spawn(job_loop(self.task, interval, stop_rx));
        RunningJob {
            name,
            interval,
            stop_tx,
            handle,
        }
    }
}

/// Handle to a job loop running on a tokio task.
#[derive(Debug)]
pub struct RunningJob<T> {
    name: String,
    interval: Duration,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<T>,
}

impl<T: JobTask> RunningJob<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the loop and wait until it has exited.
    pub async fn stop(self) -> Result<BackgroundJob<T>> {
        // The loop may already have gone away with a panic; the join below
        // reports that.
        let _ = self.stop_tx.send(());
        let task = self
            .handle
            .await
            .with_context(|| format!("joining background job '{}'", self.name))?;
        debug!(job = %self.name, "background job stopped");
        Ok(BackgroundJob {
            task,
            interval: self.interval,
        })
    }
}

async fn job_loop<T: JobTask>(
    mut task: T,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> T {
    loop {
        if let Err(err) = task.run_once().await {
            warn!(job = %task.name(), error = ?err, "background job pass failed");
        }

        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = sleep(interval) => {}
        }
    }
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct Counting {
        passes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl JobTask for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn run_once(&mut self) -> JobFuture<'_> {
            Box::pin(async move {
                self.passes.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    anyhow::bail!("always fails");
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn stop_interrupts_long_interval() {
        let passes = Arc::new(AtomicUsize::new(0));
        let job = BackgroundJob::new(
            Counting { passes: passes.clone(), fail: false },
            Duration::from_secs(1000),
        );

        let running = job.run_in_background();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let job = running.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(passes.load(Ordering::SeqCst), 1);
        assert_eq!(job.task().name(), "counting");
    }

    #[tokio::test]
    async fn failing_pass_keeps_loop_alive() {
        let passes = Arc::new(AtomicUsize::new(0));
        let job = BackgroundJob::new(
            Counting { passes: passes.clone(), fail: true },
            Duration::from_millis(10),
        );

        let running = job.run_in_background();
        tokio::time::sleep(Duration::from_millis(200)).await;
        running.stop().await.unwrap();

        assert!(passes.load(Ordering::SeqCst) >= 3);
    }
}
