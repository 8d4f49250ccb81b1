// tests/supervisor_end_to_end.rs

#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::sync::Arc;

use mlrun::config::RunnerSettings;
use mlrun::engine::Supervisor;
use mlrun::store::ExperimentStatus;
use mlrun_test_utils::{
    ExecutionRequestBuilder, FakeStore, StoreCall, fast_settings, init_tracing, with_timeout,
};
use pretty_assertions::assert_eq;
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

fn supervisor(store: &Arc<FakeStore>, settings: RunnerSettings) -> Supervisor {
    Supervisor::new(store.clone(), settings)
}

#[tokio::test]
async fn test_result_document_is_collected_on_completion() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(
        work.path(),
        r#"echo '{"accuracy": 0.9}' > result.json"#,
    )
    .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Completed);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.process_exit_code(), 0);

    let record = store.record(&outcome.experiment_id).unwrap();
    assert_eq!(record.status, Some(ExperimentStatus::Completed));
    assert_eq!(record.field("result"), Some(&json!({"accuracy": 0.9})));
    assert_eq!(record.field("exit_code"), Some(&json!(0)));
    assert!(record.field("storage_size").unwrap().as_u64().unwrap() > 0);
    Ok(())
}

#[tokio::test]
async fn test_nonzero_exit_is_still_completed() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(work.path(), "exit 3").build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Completed);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.process_exit_code(), 3);

    let record = store.record(&outcome.experiment_id).unwrap();
    assert_eq!(record.field("exit_code"), Some(&json!(3)));
    assert!(record.field("result").is_none());
    assert_eq!(store.set_finished_calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_scripts_are_copied_and_linked_data_removed() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    fs::write(work.path().join("train.sh"), "echo training\n")?;
    fs::write(work.path().join("data.csv"), "1,2,3\n")?;

    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(
        work.path(),
        "test -f train.sh && test -L data.csv && cat data.csv > seen.txt",
    )
    .script_file("train.sh")
    .data_file("data.csv")
    .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;
    assert_eq!(outcome.exit_code, Some(0));

    let dir = store.storage_dir_of(&outcome.experiment_id);
    assert_eq!(fs::read_to_string(dir.join("train.sh"))?, "echo training\n");
    assert!(!dir.join("train.sh").is_symlink());
    assert!(fs::symlink_metadata(dir.join("data.csv")).is_err());
    assert_eq!(fs::read_to_string(dir.join("seen.txt"))?, "1,2,3\n");
    assert!(work.path().join("data.csv").exists());
    Ok(())
}

#[tokio::test]
async fn test_no_link_skips_data_files() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    fs::write(work.path().join("data.csv"), "x")?;

    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(work.path(), "test ! -e data.csv")
        .data_file("data.csv")
        .no_link()
        .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;
    assert_eq!(outcome.exit_code, Some(0));
    Ok(())
}

#[tokio::test]
async fn test_create_failure_propagates_without_finishing() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new().fail_create());
    let request = ExecutionRequestBuilder::shell(work.path(), "touch ran").build();

    let result = with_timeout(supervisor(&store, fast_settings()).run(&request)).await;

    assert!(result.is_err());
    let calls = store.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], StoreCall::Create { .. }));
    assert!(store.set_finished_calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_storage_mismatch_marks_failed_before_launch() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new().corrupt_files());
    let request = ExecutionRequestBuilder::shell(work.path(), "touch ran").build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Failed);
    assert_eq!(outcome.exit_code, None);
    assert_eq!(outcome.process_exit_code(), 1);

    let finished = store.set_finished_calls();
    assert_eq!(finished.len(), 1);
    let (status, fields) = &finished[0];
    assert_eq!(*status, ExperimentStatus::Failed);
    let message = fields["error"]["message"].as_str().unwrap();
    assert!(message.contains("probe"), "unexpected message: {message}");
    assert!(fields["error"]["traceback"].is_string());
    assert!(fields.get("exit_code").is_none());

    let dir = store.storage_dir_of(&outcome.experiment_id);
    assert!(!dir.join("ran").exists());
    assert!(!dir.join("console.log").exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_program_is_reported_as_failure() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request =
        ExecutionRequestBuilder::new(work.path(), &["mlrun-test-no-such-program-0xdead"]).build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Failed);
    assert_eq!(outcome.exit_code, None);
    let finished = store.set_finished_calls();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].0, ExperimentStatus::Failed);
    assert!(finished[0].1.get("storage_size").is_none());
    Ok(())
}

#[tokio::test]
async fn test_debug_run_deletes_record() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(work.path(), "true").debug().build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Completed);
    assert!(store.record(&outcome.experiment_id).is_none());
    assert!(matches!(store.calls().last(), Some(StoreCall::Delete { .. })));
    Ok(())
}

#[tokio::test]
async fn test_program_sees_forced_environment() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(
        work.path(),
        r#"printf '%s\n%s\n%s\n%s\n' "$MLSTORAGE_EXPERIMENT_ID" "$MLSTORAGE_SERVER_URI" "$CUSTOM" "$PYTHONUNBUFFERED" > env.txt"#,
    )
    .env("CUSTOM", "hello")
    .env("MLSTORAGE_EXPERIMENT_ID", "user-supplied")
    .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;
    let id = outcome.experiment_id.clone();
    let dir = store.storage_dir_of(&id);

    let seen = fs::read_to_string(dir.join("env.txt"))?;
    assert_eq!(
        seen,
        format!("{id}\nhttp://store.invalid\nhello\n1\n")
    );

    let record = store.record(&id).unwrap();
    let exec_info = record.field("exec_info").unwrap();
    assert_eq!(exec_info["work_dir"], json!(dir.to_string_lossy()));
    assert_eq!(exec_info["env"]["MLSTORAGE_EXPERIMENT_ID"], json!(id));
    assert_eq!(exec_info["env"]["PWD"], json!(dir.to_string_lossy()));
    assert!(exec_info["pid"].as_u64().is_some());
    assert!(exec_info["hostname"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_console_output_is_logged() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request =
        ExecutionRequestBuilder::shell(work.path(), "echo to-stdout; echo to-stderr >&2").build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    let log = fs::read_to_string(store.storage_dir_of(&outcome.experiment_id).join("console.log"))?;
    assert!(log.contains("to-stdout\n"));
    assert!(log.contains("to-stderr\n"));
    Ok(())
}

#[tokio::test]
async fn test_config_is_written_sorted_and_sent_on_create() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(work.path(), "true")
        .name("sorted")
        .tag("fast")
        .config("b", json!(2))
        .config("a", json!("x"))
        .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    let text = fs::read_to_string(store.storage_dir_of(&outcome.experiment_id).join("config.json"))?;
    assert_eq!(text, "{\n  \"a\": \"x\",\n  \"b\": 2\n}");

    match &store.calls()[0] {
        StoreCall::Create { name, fields } => {
            assert_eq!(name, "sorted");
            assert_eq!(fields["config"], json!({"a": "x", "b": 2}));
            assert_eq!(fields["tags"], json!(["fast"]));
            assert_eq!(fields["args"], json!(["sh", "-c", "true"]));
        }
        other => panic!("expected create first, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_final_status_is_retried() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new().fail_set_finished(2));
    let request = ExecutionRequestBuilder::shell(work.path(), "exit 0").build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Completed);
    let finished = store.set_finished_calls();
    assert_eq!(finished.len(), 3);
    assert!(finished.iter().all(|(s, _)| *s == ExperimentStatus::Completed));
    assert_eq!(
        store.record(&outcome.experiment_id).unwrap().status,
        Some(ExperimentStatus::Completed)
    );
    Ok(())
}

#[tokio::test]
async fn test_malformed_document_does_not_fail_the_run() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let mut settings = fast_settings();
    settings.collect_interval_secs = 1000;
    let request = ExecutionRequestBuilder::shell(
        work.path(),
        r#"echo '[1]' > webui.json && echo '{"accuracy": 0.9}' > result.json"#,
    )
    .build();

    let outcome = with_timeout(supervisor(&store, settings).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Completed);
    assert_eq!(outcome.exit_code, Some(0));
    let record = store.record(&outcome.experiment_id).unwrap();
    assert_eq!(record.field("result"), Some(&json!({"accuracy": 0.9})));
    assert!(record.field("webui").is_none());
    let finished = store.set_finished_calls();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].0, ExperimentStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_failed_run_still_removes_linked_data() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    fs::write(work.path().join("data.csv"), "1,2,3\n")?;
    let store = Arc::new(FakeStore::new());
    let request =
        ExecutionRequestBuilder::new(work.path(), &["mlrun-test-no-such-program-0xdead"])
            .data_file("data.csv")
            .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Failed);
    let linked = store.storage_dir_of(&outcome.experiment_id).join("data.csv");
    assert!(fs::symlink_metadata(&linked).is_err());
    assert!(work.path().join("data.csv").exists());
    Ok(())
}

#[tokio::test]
async fn test_failed_pid_update_does_not_abort_the_run() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    // Only the launch details published before the program starts get through.
    let store = Arc::new(FakeStore::new().fail_updates_after(1));
    let request = ExecutionRequestBuilder::shell(work.path(), "touch ran").build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Completed);
    assert_eq!(outcome.exit_code, Some(0));
    let exec_info = store.updates_of("exec_info");
    assert_eq!(exec_info.len(), 2);
    assert!(exec_info[0].get("pid").is_none());
    assert!(exec_info[1]["pid"].is_u64());

    let record = store.record(&outcome.experiment_id).unwrap();
    assert!(record.field("exec_info").unwrap().get("pid").is_none());
    assert!(store.storage_dir_of(&outcome.experiment_id).join("ran").exists());
    Ok(())
}

#[tokio::test]
async fn test_failed_debug_run_deletes_record() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request =
        ExecutionRequestBuilder::new(work.path(), &["mlrun-test-no-such-program-0xdead"])
            .debug()
            .build();

    let outcome = with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    assert_eq!(outcome.status, ExperimentStatus::Failed);
    assert_eq!(store.set_finished_calls()[0].0, ExperimentStatus::Failed);
    assert!(store.record(&outcome.experiment_id).is_none());
    assert!(matches!(store.calls().last(), Some(StoreCall::Delete { .. })));
    Ok(())
}

#[tokio::test]
async fn test_parent_id_is_sent_on_create() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());
    let request = ExecutionRequestBuilder::shell(work.path(), "true")
        .parent("exp-parent")
        .build();

    with_timeout(supervisor(&store, fast_settings()).run(&request)).await?;

    match &store.calls()[0] {
        StoreCall::Create { fields, .. } => assert_eq!(fields["parent_id"], json!("exp-parent")),
        other => panic!("expected create first, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_tensorboard_url_is_published() -> TestResult {
    init_tracing();
    let work = tempfile::tempdir()?;
    let store = Arc::new(FakeStore::new());

    let mut settings = fast_settings();
    settings.tensorboard.command = vec![
        "sh".into(),
        "-c".into(),
        "echo \"TensorBoard 2.0 at http://$4:6006/ (Press CTRL+C to quit)\"; exec sleep 30".into(),
        "sh".into(),
    ];
    let request = ExecutionRequestBuilder::shell(
        work.path(),
        r#"echo '{"Custom": "http://custom"}' > webui.json"#,
    )
    .tensorboard(Some("tb-host"), 0)
    .build();

    let outcome = with_timeout(supervisor(&store, settings).run(&request)).await?;
    assert_eq!(outcome.status, ExperimentStatus::Completed);

    let webui = store.updates_of("webui");
    assert_eq!(webui.first(), Some(&json!({"TensorBoard": "http://tb-host:6006"})));
    assert_eq!(webui.last(), Some(&json!({"Custom": "http://custom"})));
    Ok(())
}
