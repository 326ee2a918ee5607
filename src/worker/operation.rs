use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::envelope::Envelope;
use crate::error::{ClusterError, Result};
use crate::model::{Entity, JobId};
use crate::projection::Projector;
use crate::scheduler::{HostAction, JobSignal, QueueAction, Scheduler, SubmitRequest};

/// Text returned for job output that is missing or not yet written.
pub const NOT_AVAILABLE: &str = "Not Available";

/// Job output beyond this many bytes is cut off.
pub const MAX_OUTPUT_BYTES: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Output,
    Error,
}

impl OutputStream {
    fn extension(self) -> &'static str {
        match self {
            OutputStream::Output => ".out",
            OutputStream::Error => ".err",
        }
    }
}

/// One unit of privileged work, named by its arguments only.
///
/// Entities are identified, never carried: the worker resolves them again
/// after it has become the acting user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    SignalJob {
        job: JobId,
        signal: JobSignal,
    },
    RequeueJob {
        job: JobId,
        #[serde(default)]
        hold: bool,
    },
    SubmitJob {
        request: SubmitRequest,
    },
    ReadJobOutput {
        job: JobId,
        stream: OutputStream,
    },
    ControlQueue {
        queue: String,
        action: QueueAction,
    },
    ControlHost {
        host: String,
        action: HostAction,
    },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::SignalJob { job, signal } => write!(f, "{signal} job {job}"),
            Operation::RequeueJob { job, hold } => {
                write!(f, "requeue job {job}")?;
                if *hold {
                    write!(f, " held")?;
                }
                Ok(())
            }
            Operation::SubmitJob { request } => write!(f, "submit {:?}", request.command),
            Operation::ReadJobOutput { job, stream } => {
                write!(f, "read job {job} {}", stream.extension().trim_start_matches('.'))
            }
            Operation::ControlQueue { queue, action } => write!(f, "{action} queue {queue}"),
            Operation::ControlHost { host, action } => write!(f, "{action} host {host}"),
        }
    }
}

/// What a successful operation reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub data: Json,
    pub message: String,
}

impl Outcome {
    pub fn new(data: Json, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(Json::Null, message)
    }
}

impl From<Outcome> for Envelope {
    fn from(outcome: Outcome) -> Self {
        Envelope::ok(outcome.data, outcome.message)
    }
}

impl Operation {
    /// Whether the operation changes scheduler state.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::ReadJobOutput { .. })
    }

    /// Resolve the target, then make exactly one scheduler call.
    pub fn perform(&self, scheduler: &dyn Scheduler, projector: &Projector) -> Result<Outcome> {
        match self {
            Operation::SignalJob { job, signal } => {
                scheduler.job(*job)?;
                scheduler.signal_job(*job, *signal)?;
                Ok(Outcome::message(match signal {
                    JobSignal::Kill => "Job Killed",
                    JobSignal::Suspend => "Job Suspended",
                    JobSignal::Resume => "Job Resumed",
                }))
            }
            Operation::RequeueJob { job, hold } => {
                scheduler.job(*job)?;
                scheduler.requeue_job(*job, *hold)?;
                Ok(Outcome::message("Job Requeued"))
            }
            Operation::SubmitJob { request } => {
                let ids = scheduler.submit(request)?;
                let jobs = ids
                    .into_iter()
                    .map(|id| scheduler.job(id))
                    .collect::<Result<Vec<_>>>()?;
                let data = projector.project_all(jobs.iter().map(|job| Entity::Job(job.as_ref())))?;
                Ok(Outcome::new(data, "Job Submitted"))
            }
            Operation::ReadJobOutput { job, stream } => {
                scheduler.job(*job)?;
                let text = match scheduler.output_path(*job)? {
                    Some(base) => read_stream(&base, *stream)?,
                    None => NOT_AVAILABLE.to_string(),
                };
                Ok(Outcome::new(Json::String(text), ""))
            }
            Operation::ControlQueue { queue, action } => {
                scheduler.queue(queue)?;
                scheduler.control_queue(queue, *action)?;
                Ok(Outcome::message(match action {
                    QueueAction::Open => "Queue Opened",
                    QueueAction::Close => "Queue Closed",
                    QueueAction::Activate => "Queue Activated",
                    QueueAction::Inactivate => "Queue Inactivated",
                }))
            }
            Operation::ControlHost { host, action } => {
                scheduler.host(host)?;
                scheduler.control_host(host, *action)?;
                Ok(Outcome::message(match action {
                    HostAction::Open => "Host Opened",
                    HostAction::Close => "Host Closed",
                }))
            }
        }
    }
}

fn read_stream(base: &Path, stream: OutputStream) -> Result<String> {
    let mut path = OsString::from(base.as_os_str());
    path.push(stream.extension());
    match read_head(Path::new(&path)) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(NOT_AVAILABLE.to_string()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(ClusterError::permission_denied(format!("Unable to read job output: {e}"))
                .with_extra("path", Path::new(&path).display().to_string()))
        }
        Err(e) => Err(ClusterError::cluster_interface(format!("Unable to read job output: {e}"))
            .with_extra("path", Path::new(&path).display().to_string())),
    }
}

/// At most [`MAX_OUTPUT_BYTES`] from the start of `path`.
fn read_head(path: &Path) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)?
        .take(MAX_OUTPUT_BYTES)
        .read_to_end(&mut bytes)?;
    if bytes.len() as u64 == MAX_OUTPUT_BYTES {
        tracing::debug!(path = %path.display(), limit = MAX_OUTPUT_BYTES, "Job output reached the read limit");
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_is_tagged() {
        let op = Operation::SignalJob {
            job: JobId::new(9767, 0),
            signal: JobSignal::Kill,
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "signal_job", "job": {"job_id": 9767, "array_index": 0}, "signal": "kill"})
        );
    }

    #[test]
    fn requeue_hold_defaults_to_false() {
        let op: Operation = serde_json::from_value(
            json!({"op": "requeue_job", "job": {"job_id": 1, "array_index": 0}}),
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::RequeueJob {
                job: JobId::new(1, 0),
                hold: false
            }
        );
    }

    #[test]
    fn display_names_the_target() {
        let op = Operation::ControlQueue {
            queue: "normal".into(),
            action: QueueAction::Close,
        };
        assert_eq!(op.to_string(), "close queue normal");
        let op = Operation::ReadJobOutput {
            job: JobId::new(5, 2),
            stream: OutputStream::Error,
        };
        assert_eq!(op.to_string(), "read job 5[2] err");
        assert!(!op.is_mutating());
    }

    #[test]
    fn missing_stream_reads_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("job.1");
        assert_eq!(read_stream(&base, OutputStream::Output).unwrap(), NOT_AVAILABLE);

        std::fs::write(dir.path().join("job.1.err"), "boom\n").unwrap();
        assert_eq!(read_stream(&base, OutputStream::Error).unwrap(), "boom\n");
    }

    #[test]
    fn long_output_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("job.2");
        let long = "x".repeat(MAX_OUTPUT_BYTES as usize + 100);
        std::fs::write(dir.path().join("job.2.out"), &long).unwrap();

        let text = read_stream(&base, OutputStream::Output).unwrap();

        assert_eq!(text.len() as u64, MAX_OUTPUT_BYTES);
        assert!(long.starts_with(&text));
    }
}
