use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClusterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Fail,
}

/// The caller-facing response: `{status, data, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub data: Value,
    pub message: String,
}

impl Envelope {
    pub fn ok(data: Value, message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            data,
            message: message.into(),
        }
    }

    /// Success with no payload.
    pub fn ok_message(message: impl Into<String>) -> Self {
        Self::ok(Value::Null, message)
    }

    /// Failure carrying the flattened failure record as data.
    pub fn failure(error: &ClusterError) -> Self {
        Self {
            status: Status::Fail,
            data: error.to_record(),
            message: error.message().to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Success converted with `Into<Envelope>`, or the failure envelope.
    pub fn from_result<T: Into<Envelope>>(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(success) => success.into(),
            Err(err) => Envelope::failure(&err),
        }
    }
}

/// A bare projection is a success with no message.
impl From<Value> for Envelope {
    fn from(data: Value) -> Self {
        Envelope::ok(data, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kill_success_shape() {
        let envelope = Envelope::ok_message("Job Killed");
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"status": "OK", "data": null, "message": "Job Killed"})
        );
    }

    #[test]
    fn not_found_failure_shape() {
        let envelope = Envelope::failure(&ClusterError::no_such_job("Job not found"));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "status": "FAIL",
                "data": {"exception_class": "NoSuchJobError", "message": "Job not found"},
                "message": "Job not found"
            })
        );
    }
}
