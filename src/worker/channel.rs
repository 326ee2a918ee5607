//! The one-shot channel between the executor and a worker.
//!
//! The executor writes one [`WorkUnit`] as JSON to the worker's stdin and
//! closes it. The worker writes exactly one [`WorkerMessage`] as a single
//! JSON line to stdout and exits.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::error::{ClusterError, Result};
use crate::worker::identity::Identity;
use crate::worker::operation::{Operation, Outcome};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub invocation: Uuid,
    pub identity: Identity,
    pub operation: Operation,
}

/// The single message a worker reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkerMessage {
    Success { data: Json, message: String },
    /// A failure the worker classified itself.
    Failure { error: ClusterError },
    /// A fault the worker did not anticipate, such as a panic.
    Fault { detail: String },
}

impl WorkerMessage {
    pub fn from_result(result: Result<Outcome>) -> Self {
        match result {
            Ok(outcome) => WorkerMessage::Success {
                data: outcome.data,
                message: outcome.message,
            },
            Err(error) => WorkerMessage::Failure { error },
        }
    }

    /// Re-raise the worker's report in the caller's context. Recovered
    /// failures keep their kind; faults become backend-interface errors.
    pub fn into_result(self) -> Result<Outcome> {
        match self {
            WorkerMessage::Success { data, message } => Ok(Outcome::new(data, message)),
            WorkerMessage::Failure { error } => Err(error),
            WorkerMessage::Fault { detail } => Err(ClusterError::cluster_interface(format!(
                "Worker failed: {detail}"
            ))
            .with_extra("fault", detail)),
        }
    }

    /// One JSON line.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Decode everything a worker wrote to the channel.
///
/// Exactly one message must be present: silence and extra messages are both
/// backend-interface errors.
pub fn decode_single(bytes: &[u8]) -> Result<WorkerMessage> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ClusterError::cluster_interface(format!("Worker reported an unreadable result: {e}"))
    })?;
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let first = lines.next().ok_or_else(|| {
        ClusterError::cluster_interface("Worker exited without reporting a result")
    })?;
    let extra = lines.count();
    if extra > 0 {
        return Err(ClusterError::cluster_interface(
            "Worker reported more than one result",
        )
        .with_extra("messages", extra + 1));
    }
    serde_json::from_str(first).map_err(|e| {
        ClusterError::cluster_interface(format!("Worker reported an unreadable result: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn failure_keeps_its_kind() {
        let message = WorkerMessage::from_result(Err(ClusterError::no_such_job("Job not found")));
        let line = message.encode().unwrap();
        let decoded = decode_single(&line).unwrap();
        let err = decoded.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchJob);
        assert_eq!(err.message(), "Job not found");
    }

    #[test]
    fn fault_becomes_interface_error() {
        let err = WorkerMessage::Fault {
            detail: "index out of bounds".into(),
        }
        .into_result()
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClusterInterface);
        assert_eq!(err.extra("fault"), Some(&json!("index out of bounds")));
    }

    #[test]
    fn empty_channel_is_interface_error() {
        let err = decode_single(b"").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClusterInterface);
        assert_eq!(err.message(), "Worker exited without reporting a result");
    }

    #[test]
    fn second_message_is_rejected() {
        let one = WorkerMessage::Success {
            data: json!(null),
            message: "Job Killed".into(),
        }
        .encode()
        .unwrap();
        let two = [one.clone(), one].concat();
        let err = decode_single(&two).unwrap_err();
        assert_eq!(err.message(), "Worker reported more than one result");
        assert_eq!(err.extra("messages"), Some(&json!(2)));
    }

    #[test]
    fn success_wire_form() {
        let line = WorkerMessage::Success {
            data: json!(null),
            message: "Job Killed".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "{\"outcome\":\"success\",\"data\":null,\"message\":\"Job Killed\"}\n"
        );
    }
}
