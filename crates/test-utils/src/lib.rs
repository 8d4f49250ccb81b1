pub mod builders;
pub mod fake_store;

use std::sync::Once;
use std::time::Duration;

use mlrun::config::RunnerSettings;
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::ExecutionRequestBuilder;
pub use fake_store::{FakeStore, StoreCall};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 20-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(20), f)
        .await
        .expect("Test timed out after 20 seconds")
}

/// Settings with one-second intervals and no retry waits.
pub fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        heartbeat_interval_secs: 1,
        collect_interval_secs: 1,
        retry_backoff_secs: vec![0, 0],
        ..RunnerSettings::default()
    }
}
