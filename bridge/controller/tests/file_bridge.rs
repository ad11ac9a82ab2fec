//! Controller and executor exchanging commands through a real directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bridge_controller::{BridgeTools, ControllerClient, ToolSurface, WaitPolicy};
use bridge_core::ChannelPair;
use bridge_executor::{ExecutorCapability, ExecutorLoop, PassOutcome, QueryResolution};
use bridge_spec::{
    Command, QueryParams, Response, Status, COMMAND_FILE, EXECUTED_MARKER, RESPONSE_FILE,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct ScriptedHost;

impl ExecutorCapability for ScriptedHost {
    fn execute(&self, action: &str) -> anyhow::Result<Option<Value>> {
        match action {
            "noop" => Ok(None),
            "fail" => anyhow::bail!("boom"),
            other => Ok(Some(json!(format!("ran {other}")))),
        }
    }

    fn resolve_query(
        &self,
        name: &str,
        _params: Option<&QueryParams>,
    ) -> anyhow::Result<QueryResolution> {
        match name {
            "get_project_info" => Ok(QueryResolution::Found(json!({ "Title": "demo" }))),
            _ => Ok(QueryResolution::Unrecognized),
        }
    }
}

fn policy(timeout: Duration) -> WaitPolicy {
    WaitPolicy {
        poll_interval: Duration::from_millis(20),
        timeout,
        grace: Duration::from_millis(5),
    }
}

struct RunningExecutor {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningExecutor {
    fn spawn(dir: &Path, capability: Arc<dyn ExecutorCapability>) -> Self {
        let executor = ExecutorLoop::new(ChannelPair::open(dir).unwrap(), capability);
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(executor.run_until(Duration::from_millis(20), async move {
            let _ = stop_rx.await;
        }));
        Self { stop, task }
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap();
    }
}

fn scripted_executor(dir: &Path) -> ExecutorLoop {
    ExecutorLoop::new(ChannelPair::open(dir).unwrap(), Arc::new(ScriptedHost))
}

fn client(dir: &Path, timeout: Duration) -> ControllerClient {
    ControllerClient::new(ChannelPair::open(dir).unwrap(), policy(timeout))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn query_round_trip_leaves_no_files() {
    let dir = TempDir::new().unwrap();
    let executor = RunningExecutor::spawn(dir.path(), Arc::new(ScriptedHost));
    let client = client(dir.path(), Duration::from_secs(5));

    let response = client.submit(Command::read("get_project_info")).await.unwrap();
    executor.shutdown().await;

    assert_eq!(response, Response::success(json!({ "Title": "demo" })));
    assert!(!dir.path().join(COMMAND_FILE).exists());
    assert!(!dir.path().join(RESPONSE_FILE).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_results_cover_success_unknown_and_failure() {
    let dir = TempDir::new().unwrap();
    let executor = RunningExecutor::spawn(dir.path(), Arc::new(ScriptedHost));
    let tools = BridgeTools::new(client(dir.path(), Duration::from_secs(5)));

    let unknown: Value =
        serde_json::from_str(&tools.run_query("nonexistent_query_xyz").await.unwrap()).unwrap();
    assert_eq!(unknown["status"], "success");
    assert_eq!(unknown["data"], "Unknown query: nonexistent_query_xyz");

    let silent: Value = serde_json::from_str(&tools.run_action("noop").await.unwrap()).unwrap();
    assert_eq!(silent["data"], EXECUTED_MARKER);

    let failed: Value = serde_json::from_str(&tools.run_action("fail").await.unwrap()).unwrap();
    assert_eq!(failed["status"], "error");
    assert!(failed["data"].as_str().unwrap().contains("boom"));

    executor.shutdown().await;
}

#[tokio::test]
async fn timeout_without_executor_keeps_command_file() {
    let dir = TempDir::new().unwrap();
    let client = client(dir.path(), Duration::from_millis(200));

    let response = client.submit(Command::execute("noop")).await.unwrap();

    assert_eq!(response.status, Status::Error);
    assert!(response.data.as_str().unwrap().contains("Timed out"));
    assert!(dir.path().join(COMMAND_FILE).exists());
    assert!(!dir.path().join(RESPONSE_FILE).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_response_is_discarded_by_next_call() {
    let dir = TempDir::new().unwrap();
    let client = client(dir.path(), Duration::from_millis(100));
    let first = client.submit(Command::execute("first")).await.unwrap();
    assert_eq!(first.status, Status::Error);

    // Executor comes up late and answers the abandoned command.
    let executor = scripted_executor(dir.path());
    assert_eq!(
        executor.poll_once().unwrap(),
        PassOutcome::Responded(Status::Success)
    );
    assert!(dir.path().join(RESPONSE_FILE).exists());

    let running = RunningExecutor::spawn(dir.path(), Arc::new(ScriptedHost));
    let client = ControllerClient::new(
        ChannelPair::open(dir.path()).unwrap(),
        policy(Duration::from_secs(5)),
    );
    let second = client.submit(Command::execute("second")).await.unwrap();
    running.shutdown().await;

    assert_eq!(second, Response::success("ran second"));
}

#[test]
fn empty_directory_pass_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let executor = scripted_executor(dir.path());
    assert_eq!(executor.poll_once().unwrap(), PassOutcome::Idle);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shell_actions_run_in_the_project_directory() {
    let bridge = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    let capability =
        bridge_executor::host::project_capability(project.path(), bridge.path()).unwrap();
    let executor = RunningExecutor::spawn(bridge.path(), Arc::new(capability));
    let client = client(bridge.path(), Duration::from_secs(10));

    let touched = client
        .submit(Command::execute("touch marker.txt"))
        .await
        .unwrap();
    let echoed = client.submit(Command::execute("echo hi")).await.unwrap();
    executor.shutdown().await;

    assert_eq!(touched, Response::success(EXECUTED_MARKER));
    assert_eq!(echoed, Response::success("hi"));
    assert!(project.path().join("marker.txt").exists());
}
