//! Task lifecycle: polling, cancellation, persistence and resume.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{ApplySpec, TaskState};
use common::{exception, value, Harness};
use host_agent::task::TaskCanceller;
use host_agent::task_store::{TaskRecord, TaskStore};
use host_agent::{AgentError, TaskService};
use serde_json::{json, Value};

/// Records are dropped just after the terminal state is published.
async fn wait_for_empty(store: &TaskStore) {
    for _ in 0..200 {
        if store.load().await.unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task records were not removed");
}

fn apply_spec() -> serde_json::Value {
    json!({
        "job": {"name": "web", "template": "nginx"},
        "configuration_hash": "h-2"
    })
}

#[tokio::test]
async fn test_running_task_renders_handle_then_value() {
    let h = Harness::new();
    h.applier.hold.store(true, Ordering::SeqCst);

    let id = h.start_task("apply", json!([apply_spec()])).await;
    assert_eq!(
        value(h.call("get_task", json!([id])).await),
        json!({"agent_task_id": id, "state": "running"})
    );

    h.applier.release.notify_one();
    assert_eq!(h.wait_for(&id).await, TaskState::Done);
    assert_eq!(value(h.call("get_task", json!([id])).await), json!("applied"));
    // Terminal results are stable.
    assert_eq!(value(h.call("get_task", json!([id])).await), json!("applied"));

    assert_eq!(h.events.all(), vec!["apply h-2"]);
    assert_eq!(h.specs.spec.lock().unwrap().config_hash(), Some("h-2"));
}

#[tokio::test]
async fn test_apply_without_hash_only_persists() {
    let h = Harness::new();
    let id = h
        .start_task("apply", json!([{"deployment": "cf", "index": 0}]))
        .await;
    assert_eq!(h.wait_for(&id).await, TaskState::Done);
    assert!(h.events.all().is_empty());
    assert_eq!(h.specs.spec.lock().unwrap().deployment.as_deref(), Some("cf"));
}

#[tokio::test]
async fn test_failed_task_surfaces_error() {
    let h = Harness::new();
    *h.applier.fail_with.lock().unwrap() = Some("disk full".into());

    let id = h.start_task("apply", json!([apply_spec()])).await;
    assert_eq!(h.wait_for(&id).await, TaskState::Failed);
    assert_eq!(
        exception(h.call("get_task", json!([id])).await),
        "Applying: disk full"
    );
    assert_eq!(*h.specs.spec.lock().unwrap(), ApplySpec::default());
}

#[tokio::test]
async fn test_unknown_task_id() {
    let h = Harness::new();
    assert_eq!(
        exception(h.call("get_task", json!(["nope"])).await),
        "Task with id nope could not be found"
    );
    assert_eq!(
        exception(h.call("cancel_task", json!(["nope"])).await),
        "Task with id nope could not be found"
    );
}

#[tokio::test]
async fn test_cancel_unsupported_leaves_task_running() {
    let h = Harness::new();
    h.applier.hold.store(true, Ordering::SeqCst);
    let id = h.start_task("apply", json!([apply_spec()])).await;

    assert_eq!(
        exception(h.call("cancel_task", json!([id])).await),
        "not supported"
    );
    assert_eq!(h.tasks.find_task(&id).unwrap().state, TaskState::Running);

    h.applier.release.notify_one();
    assert_eq!(h.wait_for(&id).await, TaskState::Done);
}

#[tokio::test]
async fn test_errand_cancellation() {
    let h = Harness::new();
    h.set_current_spec(json!({"job": {"name": "smoke", "template": "smoke-tests"}}));

    let id = h.start_task("run_errand", json!([])).await;
    assert_eq!(value(h.call("cancel_task", json!([id])).await), json!("canceled"));
    assert_eq!(h.tasks.find_task(&id).unwrap().state, TaskState::Cancelled);

    // The errand's own failure after being killed must not overwrite the cancellation.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.tasks.find_task(&id).unwrap().state, TaskState::Cancelled);
    assert_eq!(
        exception(h.call("get_task", json!([id])).await),
        format!("Task with id {id} was canceled")
    );
    assert_eq!(
        exception(h.call("cancel_task", json!([id])).await),
        format!("Task with id {id} is not running")
    );
}

#[tokio::test]
async fn test_errand_result() {
    let h = Harness::new();
    h.errands.finish.store(true, Ordering::SeqCst);

    let id = h.start_task("run_errand", json!([])).await;
    assert_eq!(h.wait_for(&id).await, TaskState::Failed);
    assert_eq!(
        exception(h.call("get_task", json!([id])).await),
        "At least one job template is required to run an errand"
    );

    h.set_current_spec(json!({"job": {"name": "smoke", "template": "smoke-tests"}}));
    let id = h.start_task("run_errand", json!([])).await;
    h.wait_for(&id).await;
    assert_eq!(
        value(h.call("get_task", json!([id])).await),
        json!({"stdout": "smoke-tests ok\n", "stderr": "", "exit_code": 0})
    );
}

#[tokio::test]
async fn test_persistent_task_record_lives_until_terminal() {
    let h = Harness::new();
    let store = TaskStore::new(h.dirs().tasks_path());
    h.applier.hold.store(true, Ordering::SeqCst);

    let id = h.start_task("apply", json!([apply_spec()])).await;
    let records = store.load().await.unwrap();
    assert_eq!(
        records,
        vec![TaskRecord {
            task_id: id.clone(),
            method: "apply".into(),
            arguments: vec![apply_spec()],
        }]
    );

    h.applier.release.notify_one();
    h.wait_for(&id).await;
    wait_for_empty(&store).await;

    // Non-persistent asynchronous actions are never recorded.
    let id = h.start_task("prepare", json!([apply_spec()])).await;
    h.wait_for(&id).await;
    assert!(store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path().join("bosh").join("tasks.json"));
    store
        .add(TaskRecord {
            task_id: "apply-1".into(),
            method: "apply".into(),
            arguments: vec![apply_spec()],
        })
        .await
        .unwrap();
    store
        .add(TaskRecord {
            task_id: "compile-1".into(),
            method: "compile_package".into(),
            arguments: vec![json!("b"), json!("s"), json!("ruby"), json!("1"), json!({})],
        })
        .await
        .unwrap();
    store
        .add(TaskRecord {
            task_id: "gone-1".into(),
            method: "retired_action".into(),
            arguments: vec![],
        })
        .await
        .unwrap();

    let h = Harness::with_dir(dir, TaskService::with_store(store.clone()));
    assert_eq!(h.dispatcher.resume_persisted().await.unwrap(), 3);

    assert_eq!(h.wait_for("apply-1").await, TaskState::Done);
    assert_eq!(value(h.call("get_task", json!(["apply-1"])).await), json!("applied"));
    assert_eq!(h.events.all(), vec!["apply h-2"]);

    assert_eq!(h.wait_for("compile-1").await, TaskState::Failed);
    assert_eq!(
        exception(h.call("get_task", json!(["compile-1"])).await),
        "not supported"
    );
    assert!(h.compiler.compiled.lock().unwrap().is_empty());

    assert_eq!(h.wait_for("gone-1").await, TaskState::Failed);
    assert_eq!(
        exception(h.call("get_task", json!(["gone-1"])).await),
        "unknown message retired_action"
    );

    wait_for_empty(&store).await;
}

#[tokio::test]
async fn test_prune_drops_finished_tasks() {
    let h = Harness::new();
    h.applier.hold.store(true, Ordering::SeqCst);
    let running = h.start_task("apply", json!([apply_spec()])).await;
    let done = h.start_task("prepare", json!([apply_spec()])).await;
    h.wait_for(&done).await;

    assert_eq!(h.tasks.prune_finished(Duration::from_secs(3600)), 0);
    assert_eq!(h.tasks.prune_finished(Duration::ZERO), 1);
    assert_eq!(
        exception(h.call("get_task", json!([done])).await),
        format!("Task with id {done} could not be found")
    );
    assert!(h.tasks.find_task(&running).is_some());

    h.applier.release.notify_one();
    h.wait_for(&running).await;
}

async fn lose_controller() -> Result<Value, AgentError> {
    panic!("disk controller vanished")
}

#[tokio::test]
async fn test_panicking_task_is_failed() {
    let h = Harness::new();
    let canceller: Arc<dyn TaskCanceller> =
        Arc::new(|| -> anyhow::Result<()> { Err(AgentError::NotSupported.into()) });
    let task = h.tasks.create_task(lose_controller(), canceller);

    assert_eq!(h.wait_for(&task.id).await, TaskState::Failed);
    assert_eq!(
        exception(h.call("get_task", json!([task.id])).await),
        "Task panicked: disk controller vanished"
    );
    assert_eq!(
        exception(h.call("cancel_task", json!([task.id])).await),
        format!("Task with id {} is not running", task.id)
    );
}
