use flowjob::{
    BasicEnvironment, ClusterClient, Error, FailureKind, JobController, JobCoordinate, JobHandle,
    JobHandleRef, JobStatus, LaunchRequest, LocalCluster, MonitorConfig, ServiceEnv,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn workdir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("flowjob-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cluster() -> Arc<LocalCluster> {
    Arc::new(LocalCluster::spawn_in(16, workdir()))
}

fn controller(cluster: Arc<LocalCluster>) -> JobController {
    let tick = Duration::from_millis(10);
    JobController::new(cluster, Arc::new(BasicEnvironment::new()))
        .with_service_env(ServiceEnv::new().with_service_url("http://metadata:8080"))
        .with_monitor_config(
            MonitorConfig::default()
                .with_polls(tick, tick, tick)
                .with_completion_timeout(Duration::from_secs(5)),
        )
}

fn request(step: &str, retry_count: u16, step_cli: &str) -> LaunchRequest {
    let coordinate = JobCoordinate::new("alice", "HelloFlow", "42", step, "1", retry_count);
    LaunchRequest::new(coordinate, step_cli, "python:3.9")
}

async fn run(ctl: &JobController) -> (flowjob::error::Result<()>, Vec<String>) {
    let mut lines = vec![];
    let result = ctl
        .wait(|_: &str, line: &str| lines.push(line.to_string()))
        .await;
    (result, lines)
}

async fn finished(job: &JobHandleRef) -> JobStatus {
    loop {
        let status = job.state().await.unwrap().status;
        if status.is_finished() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn step_runs_to_success() {
    let mut ctl = controller(cluster());
    ctl.launch(request("start", 0, "echo $FLOWJOB_USER at $FLOWJOB_SERVICE_URL"))
        .await
        .unwrap();
    let (result, lines) = run(&ctl).await;

    assert!(result.is_ok(), "{:?}", result);
    let expected = [
        "Setting up task environment.",
        "Task is starting.",
        "alice at http://metadata:8080",
        "Task finished with status succeeded.",
    ];
    let positions: Vec<_> = expected
        .iter()
        .map(|line| lines.iter().position(|l| l == line).unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

#[tokio::test]
async fn failing_step_is_a_retryable_crash() {
    let mut ctl = controller(cluster());
    ctl.launch(request("end", 0, "exit 7")).await.unwrap();
    let (result, _) = run(&ctl).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Crashed);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("exit code 7"));
}

#[tokio::test]
async fn run_time_limit_crashes_the_step() {
    let mut ctl = controller(cluster());
    let mut request = request("slow", 0, "sleep 30");
    request.run_time_limit = Some(Duration::from_millis(500));
    ctl.launch(request).await.unwrap();
    let (result, _) = run(&ctl).await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Crashed { .. }));
    assert!(err.to_string().contains("DeadlineExceeded"));
}

#[tokio::test]
async fn same_attempt_cannot_be_launched_twice() {
    let cluster = cluster();
    let mut first = controller(cluster.clone());
    first.launch(request("start", 0, "true")).await.unwrap();

    let mut second = controller(cluster.clone());
    let err = second.launch(request("start", 0, "true")).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Infrastructure);

    // a retry gets a fresh name
    second.launch(request("start", 1, "true")).await.unwrap();
}

#[tokio::test]
async fn kill_jobs_terminates_the_run() {
    let cluster = cluster();
    let mut a = controller(cluster.clone());
    let mut b = controller(cluster.clone());
    a.launch(request("a", 0, "sleep 30")).await.unwrap();
    b.launch(request("b", 0, "sleep 30")).await.unwrap();

    let mut listed = vec![];
    let jobs = a
        .list_jobs("helloflow", "42", Some("ALICE"), |line: &str| {
            listed.push(line.to_string())
        })
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(listed.len(), 2);

    let killed = a.kill_jobs("HelloFlow", "42", None, |_: &str| {}).await.unwrap();
    assert_eq!(killed, 2);
    for ctl in [&a, &b] {
        let job = ctl.job().unwrap();
        assert_eq!(finished(job).await, JobStatus::Killed);
    }
    assert!(cluster.unfinished_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn dropped_controller_kills_its_job() {
    let mut ctl = controller(cluster());
    ctl.launch(request("orphan", 0, "sleep 30")).await.unwrap();
    let job = ctl.job().cloned().unwrap();
    drop(ctl);
    assert_eq!(finished(&job).await, JobStatus::Killed);
}

#[tokio::test]
async fn second_launch_cannot_orphan_the_first_job() {
    let cluster = cluster();
    let mut ctl = controller(cluster.clone());
    ctl.launch(request("first", 0, "sleep 30")).await.unwrap();
    let first = ctl.job().cloned().unwrap();

    let err = ctl.launch(request("second", 0, "sleep 30")).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyLaunched(_)));
    assert_eq!(cluster.unfinished_jobs().await.unwrap().len(), 1);

    drop(ctl);
    assert_eq!(finished(&first).await, JobStatus::Killed);
}
