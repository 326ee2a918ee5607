
use std::sync::Arc;

use uuid::Uuid;

use batchgate::error::ErrorKind;
use batchgate::model::{JobId, JobStatus};
use batchgate::projection::Projector;
use batchgate::scheduler::{JobSignal, MemoryScheduler, Scheduler};
use batchgate::worker::{decode_single, Identity, Operation, WorkUnit, WorkerMessage, WorkerRuntime};
use test_harness::{sample_scheduler, RecordingDrop};

fn runtime(scheduler: &MemoryScheduler, drops: Arc<RecordingDrop>) -> WorkerRuntime {
    WorkerRuntime::new(Arc::new(scheduler.clone()), drops, Projector::default())
}

fn kill_unit(user: &str, uid: u32, job_id: u64) -> WorkUnit {
    WorkUnit {
        invocation: Uuid::new_v4(),
        identity: Identity::new(user, uid, uid),
        operation: Operation::SignalJob {
            job: JobId::new(job_id, 0),
            signal: JobSignal::Kill,
        },
    }
}

#[test]
fn test_serve_one_writes_a_single_line() {
    let scheduler = sample_scheduler();
    let drops = Arc::new(RecordingDrop::default());
    let input = serde_json::to_vec(&kill_unit("alice", 1001, 9767)).unwrap();
    let mut output = Vec::new();

    runtime(&scheduler, drops.clone())
        .serve_one(input.as_slice(), &mut output)
        .unwrap();

    assert_eq!(output.last(), Some(&b'\n'));
    assert_eq!(output.iter().filter(|byte| **byte == b'\n').count(), 1);
    match decode_single(&output).unwrap() {
        WorkerMessage::Success { message, .. } => assert_eq!(message, "Job Killed"),
        other => panic!("unexpected message: {other:?}"),
    }
    assert_eq!(drops.dropped(), vec![1001]);
    let job = scheduler.job(JobId::new(9767, 0)).unwrap();
    assert_eq!(job.status().unwrap(), JobStatus::Exited);
}

#[test]
fn test_serve_one_reports_refused_operation() {
    let scheduler = sample_scheduler();
    let drops = Arc::new(RecordingDrop::default());
    // carol neither owns 9767 nor administers its queue.
    let input = serde_json::to_vec(&kill_unit("carol", 1003, 9767)).unwrap();
    let mut output = Vec::new();

    runtime(&scheduler, drops)
        .serve_one(input.as_slice(), &mut output)
        .unwrap();

    let err = decode_single(&output).unwrap().into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn test_serve_one_rejects_unreadable_unit() {
    let scheduler = sample_scheduler();
    let drops = Arc::new(RecordingDrop::default());
    let mut output = Vec::new();

    runtime(&scheduler, drops.clone())
        .serve_one(&b"{\"invocation\": 42, garbage"[..], &mut output)
        .unwrap();

    assert_eq!(output.iter().filter(|byte| **byte == b'\n').count(), 1);
    match decode_single(&output).unwrap() {
        WorkerMessage::Failure { error } => {
            assert_eq!(error.kind(), ErrorKind::ClusterInterface);
            assert!(error.message().starts_with("Unreadable work unit"));
        }
        other => panic!("unexpected message: {other:?}"),
    }
    // Nothing ran, so no identity change either.
    assert!(drops.dropped().is_empty());
    assert_eq!(scheduler.mutation_calls(), 0);
}
