
use std::time::{Duration, Instant};

use serde_json::json;

use batchgate::envelope::{Envelope, Status};
use batchgate::error::ErrorKind;
use batchgate::model::{JobId, JobStatus};
use batchgate::scheduler::{JobSignal, QueueAction, Scheduler, SubmitRequest};
use batchgate::worker::{InvocationState, Operation, OutputStream, NOT_AVAILABLE};
use test_harness::{in_process, in_process_with, process_executor, sample_scheduler, RecordingDrop};

fn kill(job_id: u64) -> Operation {
    Operation::SignalJob {
        job: JobId::new(job_id, 0),
        signal: JobSignal::Kill,
    }
}

#[tokio::test]
async fn test_kill_owned_job() {
    let setup = in_process();

    let invocation = setup.executor.invoke("alice", kill(9767)).await;

    assert_eq!(invocation.state, InvocationState::Completed);
    let envelope = Envelope::from_result(invocation.result);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({"status": "OK", "data": null, "message": "Job Killed"})
    );

    let job = setup
        .scheduler
        .snapshot()
        .jobs
        .iter()
        .find(|job| job.job_id == 9767)
        .cloned()
        .unwrap();
    assert_eq!(job.status, JobStatus::Exited);
    assert_eq!(job.exit_status, 130);
    assert_eq!(setup.scheduler.mutation_calls(), 1);
    assert_eq!(setup.drops.dropped(), vec![1001]);
}

#[tokio::test]
async fn test_kill_missing_job_is_not_found() {
    let setup = in_process();

    let invocation = setup.executor.invoke("alice", kill(9999)).await;

    assert_eq!(invocation.state, InvocationState::Failed);
    let envelope = Envelope::from_result(invocation.result);
    assert_eq!(
        serde_json::to_value(&envelope).unwrap(),
        json!({
            "status": "FAIL",
            "data": {"exception_class": "NoSuchJobError", "message": "Job not found"},
            "message": "Job not found"
        })
    );
    assert_eq!(setup.scheduler.mutation_calls(), 0);
}

#[tokio::test]
async fn test_unknown_account_never_reaches_scheduler() {
    let setup = in_process();

    let invocation = setup.executor.invoke("bob", kill(9768)).await;

    assert_eq!(invocation.state, InvocationState::Failed);
    let err = invocation.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(setup.users.lookups(), vec!["bob".to_string()]);
    assert!(setup.drops.dropped().is_empty());
    assert_eq!(setup.scheduler.mutation_calls(), 0);
}

#[tokio::test]
async fn test_failed_identity_drop_makes_no_calls() {
    let setup = in_process_with(sample_scheduler(), RecordingDrop::refusing());

    let err = setup.executor.execute("alice", kill(9767)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(setup.scheduler.mutation_calls(), 0);
    let job = setup.scheduler.job(JobId::new(9767, 0)).unwrap();
    assert_eq!(job.status().unwrap(), JobStatus::Running);
}

#[tokio::test]
async fn test_other_users_job_is_permission_denied() {
    let setup = in_process();

    let err = setup.executor.execute("alice", kill(9768)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(err.extra("code"), Some(&json!(17)));
    assert_eq!(setup.scheduler.mutation_calls(), 1);
}

#[tokio::test]
async fn test_queue_admin_controls_jobs_in_queue() {
    let setup = in_process();

    let outcome = setup
        .executor
        .execute(
            "qadmin",
            Operation::SignalJob {
                job: JobId::new(9768, 0),
                signal: JobSignal::Suspend,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.message, "Job Suspended");
    let job = setup.scheduler.job(JobId::new(9768, 0)).unwrap();
    assert_eq!(job.status().unwrap(), JobStatus::Held);
}

#[tokio::test]
async fn test_requeue_pending_job_is_rejected() {
    let setup = in_process();

    let err = setup
        .executor
        .execute(
            "alice",
            Operation::RequeueJob {
                job: JobId::new(9770, 1),
                hold: false,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.extra("status"), Some(&json!("JOB_STAT_PEND")));
}

#[tokio::test]
async fn test_submit_returns_projected_jobs() {
    let setup = in_process();
    let request = SubmitRequest::new("hostname").with_job_name("sweep[1-3]");

    let outcome = setup
        .executor
        .execute("alice", Operation::SubmitJob { request })
        .await
        .unwrap();

    assert_eq!(outcome.message, "Job Submitted");
    let jobs = outcome.data.as_array().unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0]["type"], "Job");
    assert_eq!(jobs[0]["name"], "sweep[1]");
    assert_eq!(jobs[2]["array_index"], 3);
    assert_eq!(jobs[0]["user_name"], "alice");
}

#[tokio::test]
async fn test_submit_to_closed_queue_fails() {
    let setup = in_process();
    let request = SubmitRequest::new("hostname").with_queue("closed");

    let err = setup
        .executor
        .execute("alice", Operation::SubmitJob { request })
        .await
        .unwrap_err();

    assert_eq!(err.extra("code"), Some(&json!(20)));
}

#[tokio::test]
async fn test_queue_control_requires_admin() {
    let setup = in_process();
    let close = Operation::ControlQueue {
        queue: "normal".to_string(),
        action: QueueAction::Close,
    };

    let err = setup.executor.execute("alice", close.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let outcome = setup.executor.execute("qadmin", close).await.unwrap();
    assert_eq!(outcome.message, "Queue Closed");
    let queue = setup.scheduler.queue("normal").unwrap();
    assert!(!queue.is_accepting_jobs().unwrap());
}

#[tokio::test]
async fn test_read_output_without_spool_is_not_available() {
    let setup = in_process();

    let outcome = setup
        .executor
        .execute(
            "alice",
            Operation::ReadJobOutput {
                job: JobId::new(9767, 0),
                stream: OutputStream::Output,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.data, json!(NOT_AVAILABLE));
}

#[tokio::test]
async fn test_read_output_from_spool() {
    let dir = tempfile::tempdir().unwrap();
    let mut snapshot = test_harness::sample_snapshot();
    snapshot.jobs[0].output_path = Some(dir.path().join("9767"));
    std::fs::write(dir.path().join("9767.out"), "step 1\nstep 2\n").unwrap();
    let scheduler = batchgate::scheduler::MemoryScheduler::new(snapshot).unwrap();
    let setup = in_process_with(scheduler, RecordingDrop::default());

    let outcome = setup
        .executor
        .execute(
            "alice",
            Operation::ReadJobOutput {
                job: JobId::new(9767, 0),
                stream: OutputStream::Output,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.data, json!("step 1\nstep 2\n"));

    let err = setup
        .executor
        .execute(
            "carol",
            Operation::ReadJobOutput {
                job: JobId::new(9767, 0),
                stream: OutputStream::Output,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

// Process isolation, with `sh` standing in for the worker.

#[tokio::test]
async fn test_worker_success_message() {
    let executor = process_executor(
        r#"cat >/dev/null; echo '{"outcome":"success","data":null,"message":"Job Killed"}'"#,
        Duration::from_secs(5),
    );

    let invocation = executor.invoke("alice", kill(9767)).await;

    assert_eq!(invocation.state, InvocationState::Completed);
    assert_eq!(invocation.result.unwrap().message, "Job Killed");
}

#[tokio::test]
async fn test_worker_failure_message_keeps_kind() {
    let executor = process_executor(
        r#"cat >/dev/null; echo '{"outcome":"failure","error":{"kind":"NoSuchJobError","message":"Job not found"}}'"#,
        Duration::from_secs(5),
    );

    let invocation = executor.invoke("alice", kill(9999)).await;

    assert_eq!(invocation.state, InvocationState::Failed);
    let err = invocation.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchJob);
    assert_eq!(err.message(), "Job not found");
}

#[tokio::test]
async fn test_worker_fault_is_interface_error() {
    let executor = process_executor(
        r#"cat >/dev/null; echo '{"outcome":"fault","detail":"attempt to divide by zero"}'"#,
        Duration::from_secs(5),
    );

    let err = executor.execute("alice", kill(9767)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.extra("fault"), Some(&json!("attempt to divide by zero")));
}

#[tokio::test]
async fn test_crashed_worker_is_interface_error() {
    let executor = process_executor("kill -9 $$", Duration::from_secs(5));

    let invocation = executor.invoke("alice", kill(9767)).await;

    assert_eq!(invocation.state, InvocationState::Failed);
    let err = invocation.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.message(), "Worker exited without reporting a result");
    assert!(err.extra("exit_status").is_some());
}

#[tokio::test]
async fn test_hung_worker_times_out() {
    let executor = process_executor("exec sleep 30", Duration::from_millis(200));
    let started = Instant::now();

    let invocation = executor.invoke("alice", kill(9767)).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(invocation.state, InvocationState::TimedOut);
    let err = invocation.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.extra("timeout_ms"), Some(&json!(200)));
}

#[tokio::test]
async fn test_second_message_is_protocol_violation() {
    let executor = process_executor(
        r#"cat >/dev/null; m='{"outcome":"success","data":null,"message":"Job Killed"}'; echo "$m"; echo "$m""#,
        Duration::from_secs(5),
    );

    let err = executor.execute("alice", kill(9767)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ClusterInterface);
    assert_eq!(err.message(), "Worker reported more than one result");
}

#[tokio::test]
async fn test_worker_receives_work_unit() {
    // Answers "ok" only if the unit names the caller's uid and the operation.
    let executor = process_executor(
        r#"unit=$(cat); case "$unit" in *'"uid":1001'*'"op":"signal_job"'*) msg=ok;; *) msg=bad;; esac; echo "{\"outcome\":\"success\",\"data\":null,\"message\":\"$msg\"}""#,
        Duration::from_secs(5),
    );

    let outcome = executor.execute("alice", kill(9767)).await.unwrap();

    assert_eq!(outcome.message, "ok");
}

#[tokio::test]
async fn test_missing_worker_program() {
    let executor = batchgate::worker::PrivilegedExecutor::new(
        std::sync::Arc::new(test_harness::FakeUsers::standard()),
        batchgate::worker::Isolation::Process(batchgate::config::WorkerCommand::new(
            "/nonexistent/batchgate-worker",
        )),
        Duration::from_secs(1),
    );

    let invocation = executor.invoke("alice", kill(9767)).await;

    assert_eq!(invocation.state, InvocationState::Failed);
    let envelope = Envelope::from_result(invocation.result);
    assert_eq!(envelope.status, Status::Fail);
    assert_eq!(envelope.data["exception_class"], "ClusterInterfaceError");
}

#[tokio::test]
async fn test_from_config_passes_kept_privileges_to_worker() {
    // sh -c takes "worker" as $0, so an appended flag lands in $1.
    let script = r#"cat >/dev/null; case "$1" in --no-drop-privileges) msg=kept;; *) msg=dropped;; esac; echo "{\"outcome\":\"success\",\"data\":null,\"message\":\"$msg\"}""#;
    let worker = test_harness::sh_worker(script).with_arg("worker");
    let config = batchgate::config::ExecutorConfig::default()
        .with_timeout(Duration::from_secs(5))
        .with_worker(worker);
    let users = std::sync::Arc::new(test_harness::FakeUsers::standard());

    let dropping = batchgate::worker::PrivilegedExecutor::from_config(&config, users.clone());
    let outcome = dropping.execute("alice", kill(9767)).await.unwrap();
    assert_eq!(outcome.message, "dropped");

    let keeping = batchgate::worker::PrivilegedExecutor::from_config(
        &config.clone().with_drop_privileges(false),
        users,
    );
    let outcome = keeping.execute("alice", kill(9767)).await.unwrap();
    assert_eq!(outcome.message, "kept");
}
